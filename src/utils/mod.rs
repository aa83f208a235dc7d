/// Keep only the part of a URL before the first `?`
///
/// Drops tracking and playlist parameters such as `?si=...` or `?list=...`.
pub fn strip_query(url: &str) -> &str {
    match url.split_once('?') {
        Some((base, _)) => base,
        None => url,
    }
}

/// Byte count as B, or KB and up with one decimal
pub fn format_file_size(bytes: u64) -> String {
    const LARGER_UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit = LARGER_UNITS[0];
    for next in &LARGER_UNITS[1..] {
        if size < 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = next;
    }

    format!("{:.1} {}", size, unit)
}

/// Check if the current environment has required tools
pub async fn check_dependencies(yt_dlp_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp_path, "--version").await {
        missing.push(format!("{} - required to download media", yt_dlp_path));
    }

    // yt-dlp calls ffmpeg for audio extraction and thumbnail conversion
    if !check_command_available("ffmpeg", "-version").await {
        missing.push("ffmpeg - required for audio extraction and thumbnails".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_query() {
        assert_eq!(strip_query("https://youtu.be/XYZ?list=abc"), "https://youtu.be/XYZ");
        assert_eq!(strip_query("https://youtu.be/XYZ?si=a?b"), "https://youtu.be/XYZ");
        assert_eq!(strip_query("https://youtu.be/XYZ"), "https://youtu.be/XYZ");
        assert_eq!(strip_query("?only"), "");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[tokio::test]
    async fn test_missing_command_is_reported() {
        assert!(!check_command_available("definitely-not-a-real-command", "--version").await);

        let missing = check_dependencies("definitely-not-a-real-command").await;
        assert!(missing[0].starts_with("definitely-not-a-real-command"));
    }
}
