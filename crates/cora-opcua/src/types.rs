// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node identifiers and client configuration.
//!
//! - **NodeId**: the four OPC UA identifier kinds with parsing and rendering
//! - **NodeClass**: node class bit masks used as browse filters
//! - **OpcUaConfig**: session settings, trust policy, transport quotas
//! - **SubscriptionSettings / MonitoredItemSettings**: live value defaults
//!
//! # Examples
//!
//! ```
//! use cora_opcua::types::{NodeId, OpcUaConfig};
//!
//! let root: NodeId = "ns=4;s=|var|PLC.Application.PackTag.CoraMeasure.Status"
//!     .parse()
//!     .unwrap();
//! assert_eq!(root.join("StateCurrent").as_string(), Some("|var|PLC.Application.PackTag.CoraMeasure.Status.StateCurrent"));
//!
//! let config = OpcUaConfig::builder()
//!     .endpoint("opc.tcp://192.168.0.10:4840")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.request_timeout.as_secs(), 15);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, OpcUaError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA node identifier: a namespace index plus an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// Well-known `ObjectsFolder` (ns=0;i=85).
    pub const fn objects_folder() -> Self {
        Self {
            namespace_index: 0,
            identifier: NodeIdentifier::Numeric(85),
        }
    }

    /// Returns the string value if this is a string identifier.
    #[inline]
    pub fn as_string(&self) -> Option<&str> {
        match &self.identifier {
            NodeIdentifier::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the numeric value if this is a numeric identifier.
    #[inline]
    pub fn as_numeric(&self) -> Option<u32> {
        match &self.identifier {
            NodeIdentifier::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Appends a dotted path segment, the addressing scheme CODESYS uses
    /// for symbolic variables (`...PackTag.Status` + `StateCurrent`).
    ///
    /// Non-string identifiers are rendered first, so the result is always a
    /// string node id in the same namespace.
    pub fn join(&self, segment: &str) -> NodeId {
        let base = match &self.identifier {
            NodeIdentifier::String(s) => s.clone(),
            other => other.to_string(),
        };
        NodeId::string(self.namespace_index, format!("{}.{}", base, segment))
    }

    /// Converts to the OPC UA string format: `ns=<namespace>;{i|s|g|b}=<identifier>`.
    pub fn to_opc_string(&self) -> String {
        let id_str = match &self.identifier {
            NodeIdentifier::Numeric(v) => format!("i={}", v),
            NodeIdentifier::String(v) => format!("s={}", v),
            NodeIdentifier::Guid(v) => format!("g={}", v),
            NodeIdentifier::Opaque(v) => format!("b={}", BASE64.encode(v)),
        };

        if self.namespace_index == 0 {
            id_str
        } else {
            format!("ns={};{}", self.namespace_index, id_str)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses `ns=<n>;i=..`, `ns=<n>;s=..`, `ns=<n>;g=..`, `ns=<n>;b=..`
    /// and their namespace-0 short forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| {
            OpcUaError::configuration(ConfigurationError::new("node_id", format!("'{}': {}", s, reason)))
        };

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns_str, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("missing identifier after namespace".into()))?;
                let ns: u16 = ns_str
                    .parse()
                    .map_err(|_| invalid("invalid namespace index".into()))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(
                id.parse()
                    .map_err(|_| invalid("invalid numeric identifier".into()))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(
                Uuid::parse_str(id).map_err(|e| invalid(format!("invalid GUID: {}", e)))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            NodeIdentifier::Opaque(
                BASE64
                    .decode(id)
                    .map_err(|e| invalid(format!("invalid base64: {}", e)))?,
            )
        } else {
            return Err(invalid("expected i=, s=, g= or b=".into()));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// The identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque (byte string) identifier.
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::Guid(v) => write!(f, "{}", v),
            Self::Opaque(v) => write!(f, "{}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// NodeClass
// =============================================================================

/// OPC UA node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Returns the OPC UA bit mask value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }

    /// Creates from OPC UA value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Object),
            2 => Some(Self::Variable),
            4 => Some(Self::Method),
            8 => Some(Self::ObjectType),
            16 => Some(Self::VariableType),
            32 => Some(Self::ReferenceType),
            64 => Some(Self::DataType),
            128 => Some(Self::View),
            _ => None,
        }
    }

    /// Mask selecting objects and variables.
    pub const OBJECT_OR_VARIABLE: u32 = Self::Object.value() | Self::Variable.value();
}

// =============================================================================
// TrustPolicy
// =============================================================================

/// How peer certificates are treated when the secure channel is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    /// Accept any server certificate. Suitable for isolated machine networks.
    #[default]
    AcceptAll,
    /// Validate against the PKI directory.
    PkiStore,
}

// =============================================================================
// TransportQuotas
// =============================================================================

/// Limits negotiated with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportQuotas {
    /// Maximum message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum array length.
    #[serde(default = "default_max_array_length")]
    pub max_array_length: usize,

    /// Maximum string length in bytes.
    #[serde(default = "default_max_string_length")]
    pub max_string_length: usize,

    /// Maximum byte string length in bytes.
    #[serde(default = "default_max_string_length")]
    pub max_byte_string_length: usize,

    /// Secure channel lifetime.
    #[serde(default = "default_channel_lifetime", with = "humantime_serde")]
    pub channel_lifetime: Duration,

    /// Security token lifetime.
    #[serde(default = "default_token_lifetime", with = "humantime_serde")]
    pub token_lifetime: Duration,

    /// Minimum subscription lifetime accepted by the client.
    #[serde(default = "default_min_subscription_lifetime", with = "humantime_serde")]
    pub min_subscription_lifetime: Duration,
}

fn default_max_message_size() -> usize {
    4 * 1024 * 1024
}

fn default_max_array_length() -> usize {
    65_536
}

fn default_max_string_length() -> usize {
    1024 * 1024
}

fn default_channel_lifetime() -> Duration {
    Duration::from_secs(300)
}

fn default_token_lifetime() -> Duration {
    Duration::from_secs(3600)
}

fn default_min_subscription_lifetime() -> Duration {
    Duration::from_secs(10)
}

impl Default for TransportQuotas {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            max_array_length: default_max_array_length(),
            max_string_length: default_max_string_length(),
            max_byte_string_length: default_max_string_length(),
            channel_lifetime: default_channel_lifetime(),
            token_lifetime: default_token_lifetime(),
            min_subscription_lifetime: default_min_subscription_lifetime(),
        }
    }
}

// =============================================================================
// OpcUaConfig
// =============================================================================

/// Client connection configuration.
///
/// Security mode is always `None`; the machine network is isolated and the
/// controller only exposes an unsecured endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpcUaConfig {
    /// Server endpoint URL (e.g., "opc.tcp://192.168.0.10:4840").
    pub endpoint: String,

    /// Application name announced to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Application URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_uri: Option<String>,

    /// Session name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,

    /// Session timeout.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Timeout for individual service calls.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Upper bound for a single connect attempt.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Session keep-alive interval.
    #[serde(default = "default_keepalive_interval", with = "humantime_serde")]
    pub keepalive_interval: Duration,

    /// Server certificate handling.
    #[serde(default)]
    pub trust_policy: TrustPolicy,

    /// PKI directory, used when `trust_policy` is `pki_store`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pki_dir: Option<String>,

    /// Transport limits.
    #[serde(default)]
    pub quotas: TransportQuotas,

    /// Subscription defaults.
    #[serde(default)]
    pub subscription: SubscriptionSettings,
}

fn default_application_name() -> String {
    "Cora OPC UA Client".to_string()
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(5)
}

impl OpcUaConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> OpcUaConfigBuilder {
        OpcUaConfigBuilder::default()
    }

    /// Creates a configuration with default settings for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), OpcUaError> {
        if self.endpoint.is_empty() {
            return Err(OpcUaError::configuration(ConfigurationError::new(
                "endpoint",
                "missing required field",
            )));
        }

        if !self.endpoint.starts_with("opc.tcp://") {
            return Err(OpcUaError::configuration(ConfigurationError::new(
                "endpoint",
                format!("'{}' must start with opc.tcp://", self.endpoint),
            )));
        }

        if self.trust_policy == TrustPolicy::PkiStore && self.pki_dir.is_none() {
            return Err(OpcUaError::configuration(ConfigurationError::new(
                "pki_dir",
                "required when trust_policy is pki_store",
            )));
        }

        for (field, value) in [
            ("session_timeout", self.session_timeout),
            ("request_timeout", self.request_timeout),
            ("connect_timeout", self.connect_timeout),
            ("subscription.publishing_interval", self.subscription.publishing_interval),
        ] {
            if value.is_zero() {
                return Err(OpcUaError::configuration(ConfigurationError::new(
                    field,
                    "must be greater than 0",
                )));
            }
        }

        Ok(())
    }

    /// Returns the effective application URI.
    pub fn effective_application_uri(&self) -> String {
        self.application_uri.clone().unwrap_or_else(|| {
            format!("urn:cora:opcua:{}", self.application_name.replace(' ', ""))
        })
    }

    /// Returns the effective session name.
    pub fn effective_session_name(&self) -> String {
        self.session_name
            .clone()
            .unwrap_or_else(|| format!("{} Session", self.application_name))
    }
}

impl Default for OpcUaConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            application_name: default_application_name(),
            application_uri: None,
            session_name: None,
            session_timeout: default_session_timeout(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            keepalive_interval: default_keepalive_interval(),
            trust_policy: TrustPolicy::default(),
            pki_dir: None,
            quotas: TransportQuotas::default(),
            subscription: SubscriptionSettings::default(),
        }
    }
}

// =============================================================================
// OpcUaConfigBuilder
// =============================================================================

/// Builder for [`OpcUaConfig`].
#[derive(Debug, Default)]
pub struct OpcUaConfigBuilder {
    endpoint: Option<String>,
    application_name: Option<String>,
    session_name: Option<String>,
    session_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    keepalive_interval: Option<Duration>,
    trust_policy: Option<TrustPolicy>,
    pki_dir: Option<String>,
    quotas: Option<TransportQuotas>,
    subscription: Option<SubscriptionSettings>,
}

impl OpcUaConfigBuilder {
    /// Sets the endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the session name.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the keep-alive interval.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }

    /// Sets the certificate trust policy.
    pub fn trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.trust_policy = Some(policy);
        self
    }

    /// Sets the PKI directory.
    pub fn pki_dir(mut self, dir: impl Into<String>) -> Self {
        self.pki_dir = Some(dir.into());
        self
    }

    /// Sets transport quotas.
    pub fn quotas(mut self, quotas: TransportQuotas) -> Self {
        self.quotas = Some(quotas);
        self
    }

    /// Sets subscription defaults.
    pub fn subscription(mut self, settings: SubscriptionSettings) -> Self {
        self.subscription = Some(settings);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<OpcUaConfig, OpcUaError> {
        let endpoint = self.endpoint.ok_or_else(|| {
            OpcUaError::configuration(ConfigurationError::new("endpoint", "missing required field"))
        })?;

        let config = OpcUaConfig {
            endpoint,
            application_name: self.application_name.unwrap_or_else(default_application_name),
            application_uri: None,
            session_name: self.session_name,
            session_timeout: self.session_timeout.unwrap_or_else(default_session_timeout),
            request_timeout: self.request_timeout.unwrap_or_else(default_request_timeout),
            connect_timeout: self.connect_timeout.unwrap_or_else(default_connect_timeout),
            keepalive_interval: self.keepalive_interval.unwrap_or_else(default_keepalive_interval),
            trust_policy: self.trust_policy.unwrap_or_default(),
            pki_dir: self.pki_dir,
            quotas: self.quotas.unwrap_or_default(),
            subscription: self.subscription.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// SubscriptionSettings
// =============================================================================

/// Parameters for the single live subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Publishing interval.
    #[serde(default = "default_publishing_interval", with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Lifetime count (publishing intervals before the subscription expires).
    #[serde(default = "default_lifetime_count")]
    pub lifetime_count: u32,

    /// Max keep-alive count.
    #[serde(default = "default_keepalive_count")]
    pub keepalive_count: u32,

    /// Maximum notifications per publish.
    #[serde(default = "default_max_notifications")]
    pub max_notifications_per_publish: u32,

    /// Priority.
    #[serde(default)]
    pub priority: u8,

    /// Publishing enabled.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_lifetime_count() -> u32 {
    50
}

fn default_keepalive_count() -> u32 {
    5
}

fn default_max_notifications() -> u32 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: default_publishing_interval(),
            lifetime_count: default_lifetime_count(),
            keepalive_count: default_keepalive_count(),
            max_notifications_per_publish: default_max_notifications(),
            priority: 0,
            publishing_enabled: true,
        }
    }
}

// =============================================================================
// MonitoredItemSettings
// =============================================================================

/// Settings applied to every monitored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemSettings {
    /// Sampling interval.
    #[serde(default = "default_sampling_interval", with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Server-side queue size.
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,

    /// Drop the oldest value when the queue is full.
    #[serde(default = "default_true")]
    pub discard_oldest: bool,
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_queue_size() -> u32 {
    1
}

impl Default for MonitoredItemSettings {
    fn default() -> Self {
        Self {
            sampling_interval: default_sampling_interval(),
            queue_size: default_queue_size(),
            discard_oldest: true,
        }
    }
}

impl MonitoredItemSettings {
    /// Default settings with a custom sampling interval.
    pub fn with_sampling_interval(interval: Duration) -> Self {
        Self {
            sampling_interval: interval,
            ..Default::default()
        }
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse() {
        let node: NodeId = "ns=2;i=1001".parse().unwrap();
        assert_eq!(node.namespace_index, 2);
        assert_eq!(node.as_numeric(), Some(1001));

        let node: NodeId = "ns=4;s=|var|CODESYS Control Win V3 x64.Application.PackTag"
            .parse()
            .unwrap();
        assert_eq!(
            node.as_string(),
            Some("|var|CODESYS Control Win V3 x64.Application.PackTag")
        );

        let node: NodeId = "i=85".parse().unwrap();
        assert_eq!(node, NodeId::objects_folder());
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=2;q=1".parse::<NodeId>().is_err());
        assert!("ns=2;g=not-a-guid".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_round_trip_string() {
        let node = NodeId::string(4, "Machine.Status");
        assert_eq!(node.to_opc_string(), "ns=4;s=Machine.Status");
        assert_eq!(node.to_string().parse::<NodeId>().unwrap(), node);
        assert_eq!(NodeId::numeric(0, 85).to_opc_string(), "i=85");
    }

    #[test]
    fn test_node_id_join() {
        let root = NodeId::string(4, "PackTag.CoraMeasure.Status");
        let child = root.join("Product[3]").join("Ingredients[0]");
        assert_eq!(
            child.as_string(),
            Some("PackTag.CoraMeasure.Status.Product[3].Ingredients[0]")
        );
        assert_eq!(NodeId::numeric(2, 7).join("X").as_string(), Some("7.X"));
    }

    #[test]
    fn test_node_class_mask() {
        assert_eq!(NodeClass::OBJECT_OR_VARIABLE, 3);
        assert_eq!(NodeClass::from_value(2), Some(NodeClass::Variable));
        assert_eq!(NodeClass::from_value(3), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = OpcUaConfig::new("opc.tcp://localhost:4840");
        assert_eq!(config.session_timeout, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.trust_policy, TrustPolicy::AcceptAll);
        assert_eq!(config.quotas.max_message_size, 4 * 1024 * 1024);
        assert_eq!(config.quotas.max_array_length, 65_536);
        assert_eq!(config.quotas.channel_lifetime, Duration::from_secs(300));
        assert_eq!(config.quotas.token_lifetime, Duration::from_secs(3600));
        assert_eq!(config.subscription.lifetime_count, 50);
        assert_eq!(config.subscription.keepalive_count, 5);
        assert_eq!(config.subscription.max_notifications_per_publish, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(OpcUaConfig::builder().build().is_err());
        assert!(OpcUaConfig::builder().endpoint("http://plc").build().is_err());
        assert!(OpcUaConfig::builder()
            .endpoint("opc.tcp://plc:4840")
            .trust_policy(TrustPolicy::PkiStore)
            .build()
            .is_err());
        assert!(OpcUaConfig::builder()
            .endpoint("opc.tcp://plc:4840")
            .request_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(OpcUaConfig::builder()
            .endpoint("opc.tcp://plc:4840")
            .trust_policy(TrustPolicy::PkiStore)
            .pki_dir("./pki")
            .build()
            .is_ok());
    }

    #[test]
    fn test_monitored_item_defaults() {
        let settings = MonitoredItemSettings::default();
        assert_eq!(settings.sampling_interval, Duration::from_secs(1));
        assert_eq!(settings.queue_size, 1);
        assert!(settings.discard_oldest);
    }
}
