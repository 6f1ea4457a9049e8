//! Turning yt-dlp's format list into the catalog the frontend renders.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

/// Best video-only stream for one resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoFormat {
    pub format_id: Option<String>,
    /// e.g. `"1080p"`
    pub quality: String,
    pub ext: String,
    pub filesize: u64,
    pub fps: Option<f64>,
    pub vcodec: String,
    #[serde(skip)]
    height: u64,
}

/// An audio-only stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFormat {
    pub format_id: Option<String>,
    pub ext: String,
    pub abr: f64,
    pub acodec: Option<String>,
    pub filesize: u64,
}

/// Response payload of `/api/fetch_formats`.
#[derive(Debug, Clone, Serialize)]
pub struct FormatCatalog {
    pub title: String,
    pub video_formats: Vec<VideoFormat>,
    pub audio_formats: Vec<AudioFormat>,
    pub best_audio: Option<AudioFormat>,
    pub all_formats: Vec<Value>,
}

/// Group the formats of a `yt-dlp -J` document.
///
/// Video-only streams are deduplicated per height keeping the largest file,
/// then sorted tallest first. Audio-only streams are sorted by bitrate.
pub fn build_catalog(info: &Value) -> FormatCatalog {
    let formats: Vec<Value> = info
        .get("formats")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut by_quality: HashMap<String, VideoFormat> = HashMap::new();
    let mut audio_formats = Vec::new();

    for format in &formats {
        let vcodec = str_field(format, "vcodec");
        let acodec = str_field(format, "acodec");
        let video_only = vcodec != Some("none") && acodec == Some("none");
        let audio_only = acodec != Some("none") && vcodec == Some("none");

        if video_only {
            let Some(height) = format.get("height").and_then(as_u64).filter(|h| *h > 0) else {
                continue;
            };
            let quality = format!("{}p", height);
            let candidate = VideoFormat {
                format_id: format_id(format),
                quality: quality.clone(),
                ext: str_field(format, "ext").unwrap_or("mp4").to_string(),
                filesize: filesize(format),
                fps: format.get("fps").and_then(Value::as_f64),
                vcodec: vcodec.unwrap_or("unknown").to_string(),
                height,
            };
            match by_quality.get(&quality) {
                Some(existing) if existing.filesize >= candidate.filesize => {}
                _ => {
                    by_quality.insert(quality, candidate);
                }
            }
        } else if audio_only {
            audio_formats.push(AudioFormat {
                format_id: format_id(format),
                ext: str_field(format, "ext").unwrap_or("webm").to_string(),
                abr: format.get("abr").and_then(Value::as_f64).unwrap_or(0.0),
                acodec: acodec.map(str::to_string),
                filesize: filesize(format),
            });
        }
    }

    audio_formats.sort_by(|a, b| b.abr.total_cmp(&a.abr));
    let best_audio = audio_formats.first().cloned();

    let mut video_formats: Vec<VideoFormat> = by_quality.into_values().collect();
    video_formats.sort_by(|a, b| b.height.cmp(&a.height));

    FormatCatalog {
        title: str_field(info, "title").unwrap_or("video").to_string(),
        video_formats,
        audio_formats,
        best_audio,
        all_formats: formats,
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

/// Exact size when known, else the estimate, else 0.
fn filesize(format: &Value) -> u64 {
    format
        .get("filesize")
        .and_then(as_u64)
        .filter(|size| *size > 0)
        .or_else(|| format.get("filesize_approx").and_then(as_u64))
        .unwrap_or(0)
}

fn format_id(format: &Value) -> Option<String> {
    match format.get("format_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
