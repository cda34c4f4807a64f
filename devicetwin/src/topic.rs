//! Topic classification and construction for the twin and method channels.
//!
//! Topic layout under the twin root (`$iothub/twin`) and the methods root
//! (`$iothub/methods`):
//!
//! ```text
//! <twin>/GET/?$rid=<id>                                  publish
//! <twin>/res/<status>/?$rid=<id>                         subscribe
//! <twin>/PATCH/properties/reported/?$rid=<id>            publish
//! <twin>/PATCH/properties/desired/?$version=<v>          subscribe
//! <methods>/POST/<name>/?$rid=<id>                       subscribe
//! <methods>/res/<status>/?$rid=<id>                      publish
//! ```
//!
//! Query keys are accepted with or without the `$` prefix. Builders always
//! emit the prefixed form.

use crate::error::{Error, Result};
use crate::types::Status;

/// Default twin topic root.
pub const TWIN_ROOT: &str = "$iothub/twin";

/// Default direct-method topic root.
pub const METHODS_ROOT: &str = "$iothub/methods";

/// Kind of an inbound message, decided from its topic alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// Response to a twin document get.
    TwinGet,
    /// Desired-property patch pushed by the hub.
    TwinDesired,
    /// Response to a reported-property patch (status 204).
    TwinReported,
    /// Direct method invocation.
    Command,
}

/// Result of classifying an inbound topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: TopicKind,
    pub request_id: Option<String>,
    pub status: Option<Status>,
    pub version: Option<i64>,
    pub command: Option<String>,
}

impl Classified {
    fn new(kind: TopicKind) -> Self {
        Self {
            kind,
            request_id: None,
            status: None,
            version: None,
            command: None,
        }
    }
}

/// An outbound topic addressed by request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outgoing {
    /// Request the full twin document.
    TwinGet,
    /// Patch reported properties.
    TwinReported,
    /// Answer a direct method invocation.
    CommandResponse(Status),
}

/// Topic set for one device.
#[derive(Debug, Clone)]
pub struct Topics {
    device_id: String,
    twin_root: String,
    methods_root: String,
}

impl Topics {
    /// Topics under the default hub roots.
    pub fn new(device_id: impl Into<String>) -> Result<Self> {
        Self::with_roots(device_id, TWIN_ROOT, METHODS_ROOT)
    }

    /// Topics under custom roots.
    pub fn with_roots(
        device_id: impl Into<String>,
        twin_root: impl Into<String>,
        methods_root: impl Into<String>,
    ) -> Result<Self> {
        let device_id = device_id.into();
        let twin_root = twin_root.into().trim_end_matches('/').to_string();
        let methods_root = methods_root.into().trim_end_matches('/').to_string();

        if device_id.is_empty() {
            return Err(Error::InvalidConfig("device id is empty".to_string()));
        }
        if twin_root.is_empty() || methods_root.is_empty() {
            return Err(Error::InvalidConfig("topic root is empty".to_string()));
        }
        if twin_root == methods_root {
            return Err(Error::InvalidConfig(format!(
                "twin and methods share root {}",
                twin_root
            )));
        }

        Ok(Self {
            device_id,
            twin_root,
            methods_root,
        })
    }

    /// The device these topics belong to.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Topic filters the device subscribes to at session start.
    pub fn subscriptions(&self) -> [String; 3] {
        [
            format!("{}/PATCH/properties/desired/#", self.twin_root),
            format!("{}/res/#", self.twin_root),
            format!("{}/POST/#", self.methods_root),
        ]
    }

    /// Twin document get topic.
    pub fn twin_get(&self, request_id: &str) -> String {
        format!("{}/GET/?$rid={}", self.twin_root, request_id)
    }

    /// Reported-property patch topic.
    pub fn twin_reported(&self, request_id: &str) -> String {
        format!("{}/PATCH/properties/reported/?$rid={}", self.twin_root, request_id)
    }

    /// Direct method response topic.
    pub fn command_response(&self, status: Status, request_id: &str) -> String {
        format!("{}/res/{}/?$rid={}", self.methods_root, status, request_id)
    }

    /// Device-to-cloud telemetry topic.
    pub fn telemetry(&self) -> String {
        format!("devices/{}/messages/events/", self.device_id)
    }

    /// Builds an outbound topic for the given request id.
    pub fn build(&self, outgoing: Outgoing, request_id: &str) -> String {
        match outgoing {
            Outgoing::TwinGet => self.twin_get(request_id),
            Outgoing::TwinReported => self.twin_reported(request_id),
            Outgoing::CommandResponse(status) => self.command_response(status, request_id),
        }
    }

    /// Classifies an inbound topic.
    ///
    /// # Example
    ///
    /// ```
    /// use giztoy_devicetwin::{Status, TopicKind, Topics};
    ///
    /// let topics = Topics::new("thermostat-1").unwrap();
    /// let c = topics.classify("$iothub/twin/res/200/?$rid=7").unwrap();
    /// assert_eq!(c.kind, TopicKind::TwinGet);
    /// assert_eq!(c.status, Some(Status::Ok));
    /// assert_eq!(c.request_id.as_deref(), Some("7"));
    /// ```
    pub fn classify(&self, topic: &str) -> Result<Classified> {
        let unrecognized = || Error::UnrecognizedTopic(topic.to_string());

        if let Some(rest) = strip_root(topic, &self.twin_root) {
            if let Some(rest) = rest.strip_prefix("res/") {
                let (status, query) = split_segment(rest).ok_or_else(unrecognized)?;
                let status: u16 = status.parse().map_err(|_| unrecognized())?;
                let status = Status::from(status);
                let kind = if status == Status::NoContent {
                    TopicKind::TwinReported
                } else {
                    TopicKind::TwinGet
                };
                let mut c = Classified::new(kind);
                c.status = Some(status);
                c.request_id = query_param(query, "rid");
                return Ok(c);
            }
            if let Some(rest) = rest.strip_prefix("PATCH/properties/desired") {
                let query = match rest {
                    "" | "/" => "",
                    _ => rest
                        .strip_prefix("/?")
                        .or_else(|| rest.strip_prefix('?'))
                        .ok_or_else(unrecognized)?,
                };
                let mut c = Classified::new(TopicKind::TwinDesired);
                c.version = query_param(query, "version").and_then(|v| v.parse().ok());
                return Ok(c);
            }
            return Err(unrecognized());
        }

        if let Some(rest) = strip_root(topic, &self.methods_root) {
            let rest = rest.strip_prefix("POST/").ok_or_else(unrecognized)?;
            let (name, query) = split_segment(rest).ok_or_else(unrecognized)?;
            let request_id = query_param(query, "rid").ok_or_else(unrecognized)?;
            let mut c = Classified::new(TopicKind::Command);
            c.command = Some(name.to_string());
            c.request_id = Some(request_id);
            return Ok(c);
        }

        Err(unrecognized())
    }
}

fn strip_root<'a>(topic: &'a str, root: &str) -> Option<&'a str> {
    topic.strip_prefix(root)?.strip_prefix('/')
}

/// Splits `"<segment>/?<query>"` into its parts. The segment must be non-empty.
fn split_segment(rest: &str) -> Option<(&str, &str)> {
    let (segment, tail) = rest.split_once('/')?;
    if segment.is_empty() {
        return None;
    }
    let query = tail.strip_prefix('?').unwrap_or(tail);
    Some((segment, query))
}

/// Looks up `key` or `$key` in a query string.
///
/// Values are returned verbatim. A request id is echoed back to the hub, so
/// no percent or plus decoding is applied.
fn query_param(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.strip_prefix('$').unwrap_or(k) == key)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Topics {
        Topics::new("thermostat-1").unwrap()
    }

    #[test]
    fn test_classify_twin_get_response() {
        let c = topics().classify("$iothub/twin/res/200/?$rid=0").unwrap();
        assert_eq!(c.kind, TopicKind::TwinGet);
        assert_eq!(c.status, Some(Status::Ok));
        assert_eq!(c.request_id.as_deref(), Some("0"));
    }

    #[test]
    fn test_classify_reported_response() {
        let c = topics()
            .classify("$iothub/twin/res/204/?$rid=3&$version=9")
            .unwrap();
        assert_eq!(c.kind, TopicKind::TwinReported);
        assert_eq!(c.request_id.as_deref(), Some("3"));
    }

    #[test]
    fn test_classify_error_response_is_twin_get() {
        let c = topics().classify("$iothub/twin/res/429/?$rid=1").unwrap();
        assert_eq!(c.kind, TopicKind::TwinGet);
        assert_eq!(c.status, Some(Status::Other(429)));
    }

    #[test]
    fn test_classify_desired_patch() {
        let c = topics()
            .classify("$iothub/twin/PATCH/properties/desired/?$version=12")
            .unwrap();
        assert_eq!(c.kind, TopicKind::TwinDesired);
        assert_eq!(c.version, Some(12));

        let c = topics()
            .classify("$iothub/twin/PATCH/properties/desired")
            .unwrap();
        assert_eq!(c.kind, TopicKind::TwinDesired);
        assert_eq!(c.version, None);
    }

    #[test]
    fn test_classify_command() {
        let c = topics().classify("$iothub/methods/POST/ping/?$rid=12").unwrap();
        assert_eq!(c.kind, TopicKind::Command);
        assert_eq!(c.command.as_deref(), Some("ping"));
        assert_eq!(c.request_id.as_deref(), Some("12"));
    }

    #[test]
    fn test_classify_accepts_plain_keys() {
        let c = topics().classify("$iothub/methods/POST/ping/?rid=5").unwrap();
        assert_eq!(c.request_id.as_deref(), Some("5"));

        let c = topics()
            .classify("$iothub/twin/PATCH/properties/desired/?version=4")
            .unwrap();
        assert_eq!(c.version, Some(4));
    }

    #[test]
    fn test_request_id_is_kept_verbatim() {
        let t = topics();
        for (topic, rid) in [
            ("$iothub/methods/POST/ping/?$rid=a+b", "a+b"),
            ("$iothub/methods/POST/ping/?$rid=1%2F2", "1%2F2"),
            ("$iothub/methods/POST/ping/?$rid=k=v", "k=v"),
            ("$iothub/twin/res/200/?$version=3&$rid=x%20y", "x%20y"),
        ] {
            let c = t.classify(topic).unwrap();
            assert_eq!(c.request_id.as_deref(), Some(rid), "{}", topic);
        }

        let c = t.classify("$iothub/methods/POST/ping/?$rid=a+b").unwrap();
        let rid = c.request_id.unwrap();
        assert_eq!(
            t.build(Outgoing::CommandResponse(Status::Ok), &rid),
            "$iothub/methods/res/200/?$rid=a+b"
        );
    }

    #[test]
    fn test_classify_skips_query_pairs_without_value() {
        let c = topics()
            .classify("$iothub/methods/POST/ping/?flag&$rid=6")
            .unwrap();
        assert_eq!(c.request_id.as_deref(), Some("6"));
    }

    #[test]
    fn test_classify_unrecognized() {
        let t = topics();
        for topic in [
            "",
            "devices/thermostat-1/messages/devicebound/",
            "$iothub/twin/GET/?$rid=1",
            "$iothub/twin/res/abc/?$rid=1",
            "$iothub/twin/PATCH/properties/reported/?$rid=1",
            "$iothub/methods/POST//?$rid=1",
            "$iothub/methods/POST/ping/",
            "$iothub/methods/res/200/?$rid=1",
            "$iothub/twinx/res/200/?$rid=1",
        ] {
            assert!(
                matches!(t.classify(topic), Err(Error::UnrecognizedTopic(_))),
                "expected unrecognized: {:?}",
                topic
            );
        }
    }

    #[test]
    fn test_build_topics() {
        let t = topics();
        assert_eq!(t.build(Outgoing::TwinGet, "0"), "$iothub/twin/GET/?$rid=0");
        assert_eq!(
            t.build(Outgoing::TwinReported, "1"),
            "$iothub/twin/PATCH/properties/reported/?$rid=1"
        );
        assert_eq!(
            t.build(Outgoing::CommandResponse(Status::Ok), "12"),
            "$iothub/methods/res/200/?$rid=12"
        );
        assert_eq!(
            t.build(Outgoing::CommandResponse(Status::NotFound), "13"),
            "$iothub/methods/res/404/?$rid=13"
        );
        assert_eq!(t.telemetry(), "devices/thermostat-1/messages/events/");
    }

    #[test]
    fn test_subscriptions() {
        let subs = topics().subscriptions();
        assert_eq!(subs[0], "$iothub/twin/PATCH/properties/desired/#");
        assert_eq!(subs[1], "$iothub/twin/res/#");
        assert_eq!(subs[2], "$iothub/methods/POST/#");
    }

    #[test]
    fn test_custom_roots() {
        let t = Topics::with_roots("dev", "twin/", "methods").unwrap();
        assert_eq!(t.twin_get("1"), "twin/GET/?$rid=1");
        let c = t.classify("methods/POST/reboot/?$rid=2").unwrap();
        assert_eq!(c.command.as_deref(), Some("reboot"));
    }

    #[test]
    fn test_invalid_topics_config() {
        assert!(matches!(Topics::new(""), Err(Error::InvalidConfig(_))));
        assert!(Topics::with_roots("dev", "", "methods").is_err());
        assert!(Topics::with_roots("dev", "same", "same").is_err());
    }
}
