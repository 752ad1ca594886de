//! SignalFx datapoint protocol buffer messages.
//!
//! Only the messages needed to upload datapoints are declared. Field numbers follow
//! `signal_fx_protocol_buffers.proto`, which is a proto2 schema, so every scalar field is optional.

use crate::observation::{Observation, ScalarValue};

/// Content type of an encoded [`DataPointUploadMessage`].
pub const CONTENT_TYPE: &str = "application/x-protobuf";

/// A datapoint value.
///
/// .proto:
/// ```protobuf
/// message Datum {
///   optional string strValue = 1;
///   optional double doubleValue = 2;
///   optional int64 intValue = 3;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct Datum {
    /// String value.
    #[prost(string, optional, tag = "1")]
    pub str_value: Option<String>,

    /// Floating-point value.
    #[prost(double, optional, tag = "2")]
    pub double_value: Option<f64>,

    /// Integer value.
    #[prost(int64, optional, tag = "3")]
    pub int_value: Option<i64>,
}

/// A datapoint dimension.
#[derive(prost::Message, Clone, PartialEq)]
pub struct Dimension {
    /// Dimension name.
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,

    /// Dimension value.
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

/// How the backend should interpret a datapoint.
#[derive(prost::Enumeration, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum MetricType {
    /// A point-in-time value.
    Gauge = 0,

    /// A count of events over the reporting interval.
    Counter = 1,

    /// A string value.
    Enum = 2,

    /// A count that accumulates across reporting intervals.
    CumulativeCounter = 3,
}

/// A single datapoint.
///
/// .proto:
/// ```protobuf
/// message DataPoint {
///   optional string source = 1;
///   optional string metric = 2;
///   optional int64 timestamp = 3;
///   optional Datum value = 4;
///   optional MetricType metricType = 5;
///   repeated Dimension dimensions = 6;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct DataPoint {
    /// Source of the datapoint.
    #[prost(string, optional, tag = "1")]
    pub source: Option<String>,

    /// Metric name.
    #[prost(string, optional, tag = "2")]
    pub metric: Option<String>,

    /// Milliseconds since the Unix epoch.
    #[prost(int64, optional, tag = "3")]
    pub timestamp: Option<i64>,

    /// Value of the datapoint.
    #[prost(message, optional, tag = "4")]
    pub value: Option<Datum>,

    /// Interpretation of the value, as a [`MetricType`].
    #[prost(enumeration = "MetricType", optional, tag = "5")]
    pub metric_type: Option<i32>,

    /// Dimensions of the datapoint.
    #[prost(message, repeated, tag = "6")]
    pub dimensions: Vec<Dimension>,
}

impl DataPoint {
    /// Creates a datapoint from an observation, stamped with `timestamp_ms`.
    pub fn from_observation(observation: &Observation, timestamp_ms: i64) -> Self {
        let (metric_type, value) = match observation.value() {
            ScalarValue::Counter(v) => {
                (MetricType::Counter, Datum { int_value: Some(v), ..Datum::default() })
            }
            ScalarValue::Gauge(v) => {
                (MetricType::Gauge, Datum { int_value: Some(v), ..Datum::default() })
            }
            ScalarValue::GaugeFloat(v) => {
                (MetricType::Gauge, Datum { double_value: Some(v), ..Datum::default() })
            }
        };

        DataPoint {
            source: None,
            metric: Some(observation.name().to_owned()),
            timestamp: Some(timestamp_ms),
            value: Some(value),
            metric_type: Some(metric_type as i32),
            dimensions: Vec::new(),
        }
    }
}

/// The body of a datapoint upload request.
///
/// .proto:
/// ```protobuf
/// message DataPointUploadMessage {
///   repeated DataPoint datapoints = 1;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct DataPointUploadMessage {
    /// Datapoints to upload.
    #[prost(message, repeated, tag = "1")]
    pub datapoints: Vec<DataPoint>,
}

impl DataPointUploadMessage {
    /// Creates an upload message holding one datapoint per observation, in order.
    pub fn from_batch(batch: &[Observation], timestamp_ms: i64) -> Self {
        Self {
            datapoints: batch
                .iter()
                .map(|observation| DataPoint::from_observation(observation, timestamp_ms))
                .collect(),
        }
    }

    /// Encodes the message.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        prost::Message::encode_to_vec(self)
    }
}
