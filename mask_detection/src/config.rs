use crate::detection::DetectionParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub detector: DetectorConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub annotator: AnnotatorConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_live_inference_size")]
    pub live_inference_size: u32,
}

fn default_confidence_threshold() -> f32 {
    0.4
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_live_inference_size() -> u32 {
    320
}

impl DetectorConfig {
    pub fn get_address(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Parameters for still images, which run at native size.
    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            inference_size: None,
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: i32,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
    #[serde(default = "default_stream_fps")]
    pub stream_fps: u64,
}

fn default_frame_width() -> u32 {
    640
}

fn default_frame_height() -> u32 {
    480
}

fn default_stream_fps() -> u64 {
    30
}

fn fps_to_delay_ms(fps: u64) -> u64 {
    (1000.0 / fps.max(1) as f64).round() as u64
}

impl CameraConfig {
    pub fn get_stream_delay_ms(&self) -> u64 {
        fps_to_delay_ms(self.stream_fps)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            stream_fps: default_stream_fps(),
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct SessionConfig {
    /// Inference runs on every `frame_skip`-th captured frame.
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_frame_skip() -> u64 {
    2
}

fn default_max_consecutive_failures() -> u32 {
    5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_skip: default_frame_skip(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct AnnotatorConfig {
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default)]
    pub labels_path: Option<PathBuf>,
    #[serde(default = "default_text_scale")]
    pub text_scale: f32,
    #[serde(default = "default_box_thickness")]
    pub box_thickness: u32,
    #[serde(default = "default_label_padding")]
    pub label_padding: u32,
}

fn default_text_scale() -> f32 {
    12.0
}

fn default_box_thickness() -> u32 {
    2
}

fn default_label_padding() -> u32 {
    4
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            labels_path: None,
            text_scale: default_text_scale(),
            box_thickness: default_box_thickness(),
            label_padding: default_label_padding(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            other => Err(format!(
                "{} is not a supported minimum log level. Use `debug`, `info` or `warn`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    get_configuration_from(&base_path.join("configuration"))
}

pub fn get_configuration_from(
    configuration_directory: &Path,
) -> Result<Config, config::ConfigError> {
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("MD")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    config.try_deserialize::<Config>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(yaml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Config>()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            "server: {host: 127.0.0.1, port: 8000}\n\
             log_level: INFO\n\
             detector: {host: localhost, port: 50051}\n",
        )
        .unwrap();

        assert_eq!(config.detector.confidence_threshold, 0.4);
        assert_eq!(config.detector.iou_threshold, 0.45);
        assert_eq!(config.detector.live_inference_size, 320);
        assert_eq!(config.detector.get_address(), "http://localhost:50051");
        assert_eq!(config.session.frame_skip, 2);
        assert_eq!(config.session.max_consecutive_failures, 5);
        assert_eq!(config.camera.frame_width, 640);
        assert_eq!(config.camera.get_stream_delay_ms(), 33);
        assert!(config.annotator.font_path.is_none());
        assert_eq!(config.log_level.as_str(), "info");
    }

    #[test]
    fn test_overrides_are_read() {
        let config = parse(
            "server: {host: 0.0.0.0, port: 9000}\n\
             log_level: debug\n\
             detector: {host: yolo, port: 1, confidence_threshold: 0.6, live_inference_size: 256}\n\
             camera: {device_index: 2}\n\
             session: {frame_skip: 3, max_consecutive_failures: 1}\n",
        )
        .unwrap();

        assert_eq!(config.server.get_address(), "0.0.0.0:9000");
        assert_eq!(config.camera.device_index, 2);
        assert_eq!(config.session.frame_skip, 3);
        assert_eq!(config.detector.detection_params().confidence_threshold, 0.6);
        assert_eq!(config.detector.detection_params().inference_size, None);
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let result = parse(
            "server: {host: 127.0.0.1, port: 8000}\n\
             log_level: loud\n\
             detector: {host: localhost, port: 50051}\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_shipped_configuration_loads() {
        let directory = Path::new(env!("CARGO_MANIFEST_DIR")).join("configuration");
        let config = get_configuration_from(&directory).unwrap();

        assert_eq!(config.detector.port, 50051);
        assert_eq!(config.session.frame_skip, 2);
        assert!(config.annotator.labels_path.is_some());
        let font_path = config.annotator.font_path.unwrap();
        assert!(Path::new(env!("CARGO_MANIFEST_DIR")).join(font_path).is_file());
    }
}
