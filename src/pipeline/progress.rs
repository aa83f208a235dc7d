use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::extractors::ProgressSample;
use crate::utils::format_file_size;
use crate::ChatKey;

/// Default minimum gap between two progress edits in the same chat
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Rate limiter for progress notifications, keyed by chat
///
/// Bursts of samples from an extractor collapse into at most one edit per
/// `interval` per chat. Entries are dropped with [`ProgressThrottle::clear`]
/// when a job ends, so the next job starts fresh.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_update: Mutex<HashMap<ChatKey, Instant>>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_update: Mutex::new(HashMap::new()),
        }
    }

    /// Returns true (and records the emission) if `chat` may be notified now
    pub fn should_emit(&self, chat: ChatKey) -> bool {
        self.should_emit_at(chat, Instant::now())
    }

    fn should_emit_at(&self, chat: ChatKey, now: Instant) -> bool {
        let mut last_update = self.last_update.lock().unwrap_or_else(PoisonError::into_inner);

        match last_update.get(&chat) {
            Some(previous) if now.saturating_duration_since(*previous) < self.interval => false,
            _ => {
                last_update.insert(chat, now);
                true
            }
        }
    }

    /// Forget the rate-limit deadline of `chat`
    pub fn clear(&self, chat: ChatKey) {
        self.last_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&chat);
    }

    pub fn is_tracked(&self, chat: ChatKey) -> bool {
        self.last_update
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&chat)
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

/// Percentage with one decimal, or `None` when the total is unknown
pub fn format_percentage(downloaded_bytes: u64, total_bytes: Option<u64>) -> Option<String> {
    let total = total_bytes.filter(|total| *total > 0)?;
    let percent = downloaded_bytes as f64 / total as f64 * 100.0;
    Some(format!("{:.1}%", percent))
}

/// Bytes per second to MB/s with one decimal
pub fn format_speed(bytes_per_second: f64) -> String {
    format!("{:.1} MB/s", bytes_per_second / 1024.0 / 1024.0)
}

/// Text of the in-place progress notice for one sample
pub fn render_progress(sample: &ProgressSample) -> String {
    let status = match format_percentage(sample.downloaded_bytes, sample.total_bytes) {
        Some(percent) => format!("Descargando: {}", percent),
        None => format!("Descargando: {}", format_file_size(sample.downloaded_bytes)),
    };

    match sample.speed.filter(|speed| *speed > 0.0) {
        Some(speed) => format!("{} | Velocidad: {}", status, format_speed(speed)),
        None => status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_formatting() {
        assert_eq!(format_percentage(512000, Some(1024000)), Some("50.0%".to_string()));
        assert_eq!(format_percentage(1, Some(3)), Some("33.3%".to_string()));
        assert_eq!(format_percentage(512000, Some(0)), None);
        assert_eq!(format_percentage(512000, None), None);
    }

    #[test]
    fn test_speed_formatting() {
        assert_eq!(format_speed(1048576.0), "1.0 MB/s");
        assert_eq!(format_speed(2.5 * 1024.0 * 1024.0), "2.5 MB/s");
    }

    #[test]
    fn test_render_progress() {
        let sample = ProgressSample {
            downloaded_bytes: 512000,
            total_bytes: Some(1024000),
            speed: Some(1572864.0),
        };
        assert_eq!(render_progress(&sample), "Descargando: 50.0% | Velocidad: 1.5 MB/s");

        let sample = ProgressSample { speed: None, ..sample };
        assert_eq!(render_progress(&sample), "Descargando: 50.0%");
    }

    #[test]
    fn test_render_without_total_omits_percentage() {
        let sample = ProgressSample {
            downloaded_bytes: 1536,
            total_bytes: Some(0),
            speed: None,
        };
        let text = render_progress(&sample);
        assert_eq!(text, "Descargando: 1.5 KB");
        assert!(!text.contains('%'));
    }

    #[test]
    fn test_throttle_collapses_bursts() {
        let throttle = ProgressThrottle::new(Duration::from_secs(3));
        let chat = ChatKey(1);
        let start = Instant::now();

        assert!(throttle.should_emit_at(chat, start));
        assert!(!throttle.should_emit_at(chat, start + Duration::from_millis(10)));
        assert!(!throttle.should_emit_at(chat, start + Duration::from_millis(2999)));
        assert!(throttle.should_emit_at(chat, start + Duration::from_secs(3)));
        assert!(!throttle.should_emit_at(chat, start + Duration::from_secs(4)));
    }

    #[test]
    fn test_throttle_is_per_chat() {
        let throttle = ProgressThrottle::new(Duration::from_secs(3));
        let now = Instant::now();

        assert!(throttle.should_emit_at(ChatKey(1), now));
        assert!(throttle.should_emit_at(ChatKey(2), now));
        assert!(!throttle.should_emit_at(ChatKey(1), now));
    }

    #[test]
    fn test_clear_forgets_deadline() {
        let throttle = ProgressThrottle::default();
        let chat = ChatKey(7);

        assert!(throttle.should_emit(chat));
        assert!(throttle.is_tracked(chat));
        assert!(!throttle.should_emit(chat));

        throttle.clear(chat);
        assert!(!throttle.is_tracked(chat));
        assert!(throttle.should_emit(chat));
    }
}
