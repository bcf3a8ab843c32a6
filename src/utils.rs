use std::ffi::OsString;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

pub const FALLBACK_FILENAME: &str = "downloaded_file";

/// Last path segment of the URL, percent-decoded and sanitized, or
/// [`FALLBACK_FILENAME`] when empty.
pub fn get_filename_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .map(|name| percent_decode_str(name).decode_utf8_lossy())
        .filter(|name| !name.is_empty())
        .map(|name| sanitize_filename(&name))
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_', "_")
}

/// `<output>.part<index>` in the output's directory.
pub fn part_path(output: &Path, index: usize) -> PathBuf {
    let mut name = output.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".part{}", index));
    output.with_file_name(name)
}

pub fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Downloads")
        .join("FastFetch_Downloader")
}
