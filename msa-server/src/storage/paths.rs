//! Object key layout inside the bucket
//!
//! ```text
//! albums/{artist}/{album}/cover.{ext}
//! albums/{album}/{title}_{timestamp}.zip
//! songs/{album}/{nn}_{name}.{ext}
//! ```

/// Object-key-safe version of a name
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`; whitespace runs become `_`.
/// A doubled `.mp3` suffix left by some tools is dropped.
pub fn safe_name(name: &str) -> String {
    let name = name.strip_suffix(".mp3").unwrap_or(name);
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = false;

    for c in name.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push('_');
            }
            last_was_space = true;
            continue;
        }
        last_was_space = false;
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            out.push(c);
        }
    }

    let out = out.trim_matches(|c| c == '_' || c == '.').to_string();
    if out.is_empty() {
        "track".to_string()
    } else {
        out
    }
}

pub fn cover_path(artist_id: &str, album_id: &str, extension: &str) -> String {
    format!("albums/{}/{}/cover.{}", safe_name(artist_id), album_id, extension)
}

pub fn song_path(album_id: &str, track_number: usize, stem: &str, extension: &str) -> String {
    format!("songs/{}/{:02}_{}.{}", album_id, track_number, safe_name(stem), extension)
}

pub fn archive_path(album_id: &str, title: &str, timestamp: i64) -> String {
    format!("albums/{}/{}_{}.zip", album_id, safe_name(title), timestamp)
}

/// Every prefix that may hold objects belonging to an album
pub fn album_prefixes(artist_id: &str, album_id: &str) -> Vec<String> {
    vec![
        format!("albums/{}/{}", safe_name(artist_id), album_id),
        format!("songs/{}", album_id),
        format!("albums/{}", album_id),
    ]
}
