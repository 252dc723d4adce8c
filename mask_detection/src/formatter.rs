use crate::detection::DetectionBatch;

/// Shown instead of an empty list so the presenter always has a line to display.
pub const NO_DETECTIONS: &str = "No face detected";

/// One `• <class> (<percent>%)` line per detection, or [`NO_DETECTIONS`].
pub fn format_results(batch: &DetectionBatch) -> Vec<String> {
    if batch.is_empty() {
        return vec![NO_DETECTIONS.to_string()];
    }

    batch
        .iter()
        .map(|detection| {
            format!(
                "• {} ({:.2}%)",
                detection.class_name,
                detection.confidence * 100.0
            )
        })
        .collect()
}
