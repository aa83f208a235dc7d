//! Labels offered to the user and the replies the bot sends

use crate::messaging::Keyboard;
use crate::MediaKind;

/// One entry of a quality menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityOption {
    /// Text on the keyboard button
    pub label: &'static str,

    /// Selector handed to the download pipeline
    pub selector: &'static str,
}

const VIDEO_QUALITIES: [QualityOption; 4] = [
    QualityOption { label: "📺 1080p", selector: "1080" },
    QualityOption { label: "📺 720p", selector: "720" },
    QualityOption { label: "📺 480p", selector: "480" },
    QualityOption { label: "📺 360p", selector: "360" },
];

const AUDIO_QUALITIES: [QualityOption; 4] = [
    QualityOption { label: "🔊 Alta (320kbps)", selector: "320" },
    QualityOption { label: "🔉 Media (192kbps)", selector: "192" },
    QualityOption { label: "🔈 Baja (128kbps)", selector: "128" },
    QualityOption { label: "🔇 Mínima (96kbps)", selector: "96" },
];

pub fn quality_options(kind: MediaKind) -> &'static [QualityOption] {
    match kind {
        MediaKind::Video => &VIDEO_QUALITIES,
        MediaKind::Audio => &AUDIO_QUALITIES,
    }
}

/// Exact label lookup in the menu of `kind`
pub fn find_quality(kind: MediaKind, label: &str) -> Option<&'static QualityOption> {
    quality_options(kind).iter().find(|option| option.label == label)
}

pub fn format_keyboard() -> Keyboard {
    Keyboard::single_row(MediaKind::ALL.iter().map(MediaKind::label))
}

pub fn quality_keyboard(kind: MediaKind) -> Keyboard {
    Keyboard::pairs(quality_options(kind).iter().map(|option| option.label))
}

pub const WELCOME: &str = "¡Hola! Soy un bot que te permite descargar videos o audio de YouTube. \
Sigue estos pasos para usarme:\n\n\
1. Envíame la URL de un video de YouTube.\n\
2. Elige si deseas descargar el video o solo el audio.\n\
3. Elige la calidad.\n\
4. ¡Listo! Te enviaré el archivo que elegiste.\n\n\
Puedes enviarme tantas URLs como quieras. ¡Comencemos!";

pub const CHOOSE_FORMAT: &str = "¿Qué deseas descargar? Elige una opción:";

pub const INVALID_FORMAT: &str = "Opción no válida. Por favor, elige entre video o audio.";

pub const INVALID_QUALITY: &str = "Calidad no válida. Por favor, elige una de las opciones del teclado.";

pub const MISSING_URL: &str = "No se encontró una URL válida. Por favor, envía primero el enlace del video.";

pub const EMPTY_URL: &str = "Por favor, envíame la URL de un video de YouTube.";

pub const STARTING: &str = "Iniciando descarga...";

pub const NEXT_URL: &str = "Envíame otra URL si deseas descargar otro video o audio.";

pub const CANCELLED: &str = "Operación cancelada. Envíame /start para comenzar de nuevo.";

pub const NOT_STARTED: &str = "Envíame /start para comenzar.";

pub const BUSY: &str = "Ya hay una descarga en curso. Espera a que termine.";

pub fn choose_quality(kind: MediaKind) -> String {
    match kind {
        MediaKind::Video => "Elige la calidad del video:".to_string(),
        MediaKind::Audio => "Elige la calidad del audio:".to_string(),
    }
}
