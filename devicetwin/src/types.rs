//! Common types shared by the twin and method paths.

use std::fmt;

/// MQTT Quality of Service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum QoS {
    /// At most once delivery (fire and forget).
    #[default]
    AtMostOnce = 0,
    /// At least once delivery (acknowledged delivery).
    AtLeastOnce = 1,
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        }
    }
}

/// Status code carried in twin response and method response topics.
///
/// Codes the device emits have named variants; anything else received from
/// the hub is kept verbatim in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NoContent,
    BadRequest,
    NotFound,
    Other(u16),
}

impl Status {
    /// Numeric status code.
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::NoContent => 204,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::Other(code) => code,
        }
    }

    /// Returns true for 2xx codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.code())
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        match code {
            200 => Status::Ok,
            204 => Status::NoContent,
            400 => Status::BadRequest,
            404 => Status::NotFound,
            other => Status::Other(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::from(200), Status::Ok);
        assert_eq!(Status::from(204), Status::NoContent);
        assert_eq!(Status::from(429), Status::Other(429));
        assert_eq!(Status::Other(429).code(), 429);
        assert_eq!(Status::NotFound.to_string(), "404");
    }

    #[test]
    fn test_status_success() {
        assert!(Status::Ok.is_success());
        assert!(Status::NoContent.is_success());
        assert!(!Status::BadRequest.is_success());
        assert!(!Status::Other(500).is_success());
    }

    #[test]
    fn test_qos_conversion() {
        assert_eq!(rumqttc::QoS::from(QoS::AtMostOnce), rumqttc::QoS::AtMostOnce);
        assert_eq!(rumqttc::QoS::from(QoS::AtLeastOnce), rumqttc::QoS::AtLeastOnce);
    }
}
