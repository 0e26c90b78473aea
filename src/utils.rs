use percent_encoding::percent_decode_str;
use url::Url;

/// Last non-empty path segment of `url`, percent-decoded, or a generated name.
pub fn get_filename_from_url(url: &Url) -> String {
    if let Some(segments) = url.path_segments() {
        if let Some(filename) = segments.last() {
            let decoded = percent_decode_str(filename).decode_utf8_lossy();
            if !decoded.is_empty() {
                return decoded.into_owned();
            }
        }
    }

    // Fallback if no filename found in path
    format!("download_{}", uuid::Uuid::new_v4())
}

/// Extracts the `filename` parameter of a Content-Disposition value.
///
/// `filename*=charset''percent%20encoded` wins over a plain `filename=`.
pub fn get_filename_from_content_disposition(cd: &str) -> Option<String> {
    let lower = cd.to_ascii_lowercase();

    if let Some(i) = lower.find("filename*=") {
        let v = param_value(&cd[i + "filename*=".len()..]);
        let encoded = match v.find("''") {
            Some(pos) => &v[pos + 2..],
            None => v,
        };
        if let Ok(decoded) = percent_decode_str(encoded).decode_utf8() {
            let name = decoded.trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }

    if let Some(i) = lower.find("filename=") {
        let v = param_value(&cd[i + "filename=".len()..]);
        if !v.is_empty() {
            return Some(v.to_string());
        }
    }
    None
}

fn param_value(rest: &str) -> &str {
    let v = rest.trim();
    let v = v.split(';').next().unwrap_or(v).trim();
    v.trim_matches('"').trim_matches('\'').trim()
}

/// Reduces a server- or URL-supplied name to a single safe path component.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned = filename.replace(
        |c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_',
        "_",
    );
    if cleaned.trim_matches('.').is_empty() {
        return format!("download_{}", uuid::Uuid::new_v4());
    }
    cleaned
}
