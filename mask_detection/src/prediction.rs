use crate::config::DetectorConfig;
use crate::detection::{
    BoundingBox, Detection, DetectionBatch, DetectionError, DetectionParams, DetectionService,
};
use crate::frame::Frame;
use detection_proto::{yolo_service_client::YoloServiceClient, Empty, ImageFrame};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::{
    runtime::Handle,
    time::{sleep, timeout, Duration},
};
use tonic::{transport::Channel, Request};
use tracing::instrument;

/// Detector reached over gRPC.
///
/// The capture loop is a plain thread, so [`DetectionService::infer`] drives the
/// async client on the runtime captured at connect time. It must not be called
/// from inside an async task; use `spawn_blocking` there.
pub struct RemoteDetectionService {
    client: YoloServiceClient<Channel>,
    class_labels: Vec<String>,
    runtime: Handle,
}

impl RemoteDetectionService {
    pub async fn connect(config: &DetectorConfig) -> Result<Self, DetectionError> {
        let mut client = Self::get_client(config.get_address()).await?;

        let labels = client
            .get_yolo_class_labels(Request::new(Empty {}))
            .await?
            .into_inner();
        let class_labels: Vec<String> = labels
            .class_labels
            .into_iter()
            .map(|color_label| color_label.label)
            .collect();
        tracing::info!("Detector serves {} classes", class_labels.len());

        Ok(Self {
            client,
            class_labels,
            runtime: Handle::current(),
        })
    }

    async fn get_client(address: String) -> Result<YoloServiceClient<Channel>, DetectionError> {
        let mut retry_delay = Duration::from_millis(50);
        let max_retry_delay = Duration::from_secs(1);
        let max_retries = 10;
        let mut retry_count = 0;

        while retry_count < max_retries {
            match timeout(
                Duration::from_secs(1),
                YoloServiceClient::connect(address.clone()),
            )
            .await
            {
                Ok(Ok(client)) => return Ok(client),
                Ok(Err(e)) => {
                    tracing::error!("Failed to connect to gRPC server: {:?}", e);
                }
                Err(_) => {
                    tracing::error!("Connection timeout");
                }
            }

            retry_count += 1;
            let jitter = rand::random::<f32>() * 0.2 + 0.9;
            sleep(retry_delay.mul_f32(jitter)).await;
            retry_delay = (retry_delay * 2).min(max_retry_delay);
        }

        Err(DetectionError::MaxRetriesExceeded)
    }

    #[instrument(skip(self, frame), fields(width = frame.width(), height = frame.height()))]
    pub async fn predict(
        &self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<DetectionBatch, DetectionError> {
        let image_data = frame.to_jpg()?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;

        let request = Request::new(ImageFrame {
            image_data,
            timestamp,
            confidence_threshold: params.confidence_threshold,
            iou_threshold: params.iou_threshold,
            inference_size: params.inference_size.unwrap_or(0),
        });

        let response = self.client.clone().predict(request).await?;
        let detections = response.into_inner().detections;

        Ok(label_detections(
            &self.class_labels,
            detections,
            params.confidence_threshold,
        ))
    }
}

impl DetectionService for RemoteDetectionService {
    fn infer(
        &self,
        frame: &Frame,
        params: &DetectionParams,
    ) -> Result<DetectionBatch, DetectionError> {
        self.runtime.block_on(self.predict(frame, params))
    }
}

fn label_detections(
    class_labels: &[String],
    detections: Vec<detection_proto::BoundingBox>,
    confidence_threshold: f32,
) -> DetectionBatch {
    detections
        .into_iter()
        .filter(|bbox| bbox.confidence >= confidence_threshold)
        .map(|bbox| {
            let class_name = usize::try_from(bbox.class_id)
                .ok()
                .and_then(|index| class_labels.get(index))
                .cloned()
                .unwrap_or_else(|| format!("class_{}", bbox.class_id));
            Detection::new(
                class_name,
                bbox.confidence,
                BoundingBox::new(bbox.x1, bbox.y1, bbox.x2, bbox.y2),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(class_id: i32, confidence: f32) -> detection_proto::BoundingBox {
        detection_proto::BoundingBox {
            class_id,
            confidence,
            x1: 10.0,
            y1: 20.0,
            x2: 100.0,
            y2: 150.0,
        }
    }

    #[test]
    fn test_label_detections_resolves_class_names() {
        let labels = vec![
            "with_mask".to_string(),
            "without_mask".to_string(),
            "mask_weared_incorrect".to_string(),
        ];

        let batch = label_detections(&labels, vec![raw(2, 0.9), raw(0, 0.5)], 0.4);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].class_name, "mask_weared_incorrect");
        assert_eq!(batch[1].class_name, "with_mask");
        assert_eq!(batch[0].bbox, BoundingBox::new(10.0, 20.0, 100.0, 150.0));
    }

    #[test]
    fn test_label_detections_handles_unknown_ids_and_threshold() {
        let labels = vec!["with_mask".to_string()];

        let detections = vec![raw(42, 0.95), raw(-1, 0.8), raw(0, 0.1)];

        let batch = label_detections(&labels, detections, 0.4);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].class_name, "class_42");
        assert_eq!(batch[1].class_name, "class_-1");
    }
}
