//! Wire types and client for the `yolo_service.YoloService` detector.
//!
//! The messages mirror `yolo_service.proto` and are declared with `prost` derives
//! directly, so building the workspace does not need `protoc`.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}

/// One encoded frame plus the detection parameters the detector must honour.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImageFrame {
    #[prost(bytes = "vec", tag = "1")]
    pub image_data: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
    #[prost(float, tag = "3")]
    pub confidence_threshold: f32,
    #[prost(float, tag = "4")]
    pub iou_threshold: f32,
    /// Longest side the detector resizes to. `0` keeps the native size.
    #[prost(uint32, tag = "5")]
    pub inference_size: u32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct BoundingBox {
    #[prost(int32, tag = "1")]
    pub class_id: i32,
    #[prost(float, tag = "2")]
    pub confidence: f32,
    #[prost(float, tag = "3")]
    pub x1: f32,
    #[prost(float, tag = "4")]
    pub y1: f32,
    #[prost(float, tag = "5")]
    pub x2: f32,
    #[prost(float, tag = "6")]
    pub y2: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PredictionBatch {
    #[prost(message, repeated, tag = "1")]
    pub detections: Vec<BoundingBox>,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ColorLabel {
    #[prost(string, tag = "1")]
    pub label: String,
    #[prost(uint32, tag = "2")]
    pub red: u32,
    #[prost(uint32, tag = "3")]
    pub green: u32,
    #[prost(uint32, tag = "4")]
    pub blue: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct YoloClassLabels {
    #[prost(message, repeated, tag = "1")]
    pub class_labels: Vec<ColorLabel>,
}

pub mod yolo_service_client {
    use tonic::codegen::{http, Body, Bytes, StdError};

    const SERVICE: &str = "/yolo_service.YoloService";

    #[derive(Debug, Clone)]
    pub struct YoloServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl YoloServiceClient<tonic::transport::Channel> {
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> YoloServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::Body>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            Self {
                inner: tonic::client::Grpc::new(inner),
            }
        }

        pub async fn predict(
            &mut self,
            request: impl tonic::IntoRequest<super::ImageFrame>,
        ) -> Result<tonic::Response<super::PredictionBatch>, tonic::Status> {
            self.unary(request.into_request(), "Predict").await
        }

        pub async fn get_yolo_class_labels(
            &mut self,
            request: impl tonic::IntoRequest<super::Empty>,
        ) -> Result<tonic::Response<super::YoloClassLabels>, tonic::Status> {
            self.unary(request.into_request(), "GetYoloClassLabels").await
        }

        async fn unary<Req, Resp>(
            &mut self,
            request: tonic::Request<Req>,
            method: &str,
        ) -> Result<tonic::Response<Resp>, tonic::Status>
        where
            Req: prost::Message + Send + Sync + 'static,
            Resp: prost::Message + Default + Send + Sync + 'static,
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let path = http::uri::PathAndQuery::try_from(format!("{}/{}", SERVICE, method))
                .map_err(|e| tonic::Status::internal(format!("invalid method path: {}", e)))?;
            let codec = tonic::codec::ProstCodec::<Req, Resp>::default();
            self.inner.unary(request, path, codec).await
        }
    }
}
