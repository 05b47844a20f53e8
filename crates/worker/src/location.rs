//! The `adb://<device-id>/<path>` url scheme.
//!
//! The authority names a device, the path names a location on it. An empty
//! authority is the virtual root that lists devices. Network devices such as
//! `192.168.1.5:5555` parse as host plus port; [`device_id`] joins them back.

use url::Url;

/// Scheme served by the worker.
pub const SCHEME: &str = "adb";

/// Device id carried in the url authority, if any.
pub fn device_id(url: &Url) -> Option<String> {
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Percent-decoded remote path, `None` when the url has no path at all.
pub fn remote_path(url: &Url) -> Option<String> {
    let raw = url.path();
    if raw.is_empty() {
        return None;
    }
    Some(
        urlencoding::decode(raw)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| raw.to_string()),
    )
}

/// Url for `path` on `device`.
pub fn device_url(device: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!("{}://{}/", SCHEME, device))?;
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .clear()
            .extend(path.split('/').filter(|s| !s.is_empty()));
    }
    Ok(url)
}

/// Same url with the path forced to `/`.
pub fn device_root(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
}

/// Url of the entry `name` inside the directory `dir`.
pub fn child_url(dir: &Url, name: &str) -> Option<Url> {
    let mut child = dir.clone();
    child.path_segments_mut().ok()?.pop_if_empty().push(name);
    Some(child)
}

/// Resolve a symlink target printed inside `dir` to an absolute url on the
/// same device. Relative targets are taken relative to `dir`.
pub fn resolve_link(dir: &Url, target: &str) -> Option<Url> {
    let device = device_id(dir)?;
    let base = remote_path(dir).unwrap_or_else(|| "/".to_string());
    device_url(&device, &join_remote(&base, target)).ok()
}

/// Join `target` onto the directory `base` and fold `.` and `..`.
pub fn join_remote(base: &str, target: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let start = if target.starts_with('/') { "" } else { base };

    for segment in start.split('/').chain(target.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    format!("/{}", parts.join("/"))
}

/// Quote a path for the device's `sh` so spaces and metacharacters in file
/// names survive `adb shell`.
pub fn shell_quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}
