//! 转换结果

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::error::{ConversionError, ErrorKind};

/// 一次转换的结果
///
/// 只能通过 `succeeded` / `failed` 构造：
/// 成功时 `text` 一定非空，失败时 `error` 一定存在且没有 `text`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_secs"
    )]
    processing_time: Option<Duration>,
}

impl ConversionResult {
    /// 成功结果；空文本会被当作提取失败
    pub fn succeeded(text: impl Into<String>, processing_time: Duration) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::failed(&ConversionError::EmptyResult, Some(processing_time));
        }
        Self {
            success: true,
            text: Some(trimmed.to_string()),
            error: None,
            error_kind: None,
            processing_time: Some(processing_time),
        }
    }

    /// 失败结果
    pub fn failed(error: &ConversionError, processing_time: Option<Duration>) -> Self {
        Self {
            success: false,
            text: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            processing_time,
        }
    }

    pub fn cancelled() -> Self {
        Self::failed(&ConversionError::Cancelled, None)
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn processing_time(&self) -> Option<Duration> {
        self.processing_time
    }

    /// 对应的 HTTP 状态码
    ///
    /// 输入错误 400，取消 503，其余自动化失败 500
    pub fn http_status(&self) -> u16 {
        match self.error_kind {
            None => 200,
            Some(ErrorKind::Input) => 400,
            Some(ErrorKind::Cancelled) => 503,
            Some(_) => 500,
        }
    }
}

/// 处理时间按秒四舍五入输出
fn serialize_secs<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => serializer.serialize_u64(duration.as_secs_f64().round() as u64),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_body() {
        let result = ConversionResult::succeeded("  Biên bản cuộc họp  \n", Duration::from_millis(41_600));
        assert!(result.success());
        assert_eq!(result.text(), Some("Biên bản cuộc họp"));
        assert_eq!(result.http_status(), 200);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "success": true, "text": "Biên bản cuộc họp", "processingTime": 42 })
        );
    }

    #[test]
    fn test_blank_text_is_not_success() {
        let result = ConversionResult::succeeded(" \n\t ", Duration::from_secs(3));
        assert!(!result.success());
        assert!(result.text().is_none());
        assert_eq!(result.error_kind(), Some(ErrorKind::Extraction));
    }

    #[test]
    fn test_failure_body_carries_kind() {
        let err = ConversionError::Timeout {
            waited: Duration::from_secs(300),
        };
        let result = ConversionResult::failed(&err, None);
        assert!(result.text().is_none());
        assert!(result.error().is_some());
        assert_eq!(result.http_status(), 500);

        let body = serde_json::to_value(&result).unwrap();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["errorKind"], json!("timeout"));
        assert!(body.get("text").is_none());
    }

    #[test]
    fn test_input_error_maps_to_client_status() {
        let err = ConversionError::FileNotFound {
            path: "/tmp/missing.mp3".into(),
        };
        assert_eq!(ConversionResult::failed(&err, None).http_status(), 400);
        assert_eq!(ConversionResult::cancelled().http_status(), 503);
    }
}
