// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::{DecodeError, DeviceDescriptor, EdgeNodeDescriptor};

/// Sparkplug B topic namespace prefix.
pub const NAMESPACE: &str = "spBv1.0";

/// STATE topic prefix for Primary Host announcements.
pub const STATE_PREFIX: &str = "STATE";

/// Sparkplug message kinds, as they appear in the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    NBirth,
    NDeath,
    NData,
    NCmd,
    DBirth,
    DDeath,
    DData,
    DCmd,
    State,
}

impl MessageType {
    /// The token used in MQTT topics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NBirth => "NBIRTH",
            Self::NDeath => "NDEATH",
            Self::NData => "NDATA",
            Self::NCmd => "NCMD",
            Self::DBirth => "DBIRTH",
            Self::DDeath => "DDEATH",
            Self::DData => "DDATA",
            Self::DCmd => "DCMD",
            Self::State => "STATE",
        }
    }

    #[must_use]
    pub const fn is_node_message(self) -> bool {
        matches!(self, Self::NBirth | Self::NDeath | Self::NData | Self::NCmd)
    }

    #[must_use]
    pub const fn is_device_message(self) -> bool {
        matches!(self, Self::DBirth | Self::DDeath | Self::DData | Self::DCmd)
    }

    #[must_use]
    pub const fn is_birth(self) -> bool {
        matches!(self, Self::NBirth | Self::DBirth)
    }

    #[must_use]
    pub const fn is_death(self) -> bool {
        matches!(self, Self::NDeath | Self::DDeath)
    }

    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, Self::NData | Self::DData)
    }

    #[must_use]
    pub const fn is_command(self) -> bool {
        matches!(self, Self::NCmd | Self::DCmd)
    }

    /// True if a payload of this kind participates in the per-node `seq`
    /// chain. NBIRTH starts the chain, NDEATH and STATE are outside it.
    #[must_use]
    pub const fn in_seq_chain(self) -> bool {
        matches!(
            self,
            Self::NData | Self::NCmd | Self::DBirth | Self::DDeath | Self::DData | Self::DCmd
        )
    }
}

impl Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NBIRTH" => Ok(Self::NBirth),
            "NDEATH" => Ok(Self::NDeath),
            "NDATA" => Ok(Self::NData),
            "NCMD" => Ok(Self::NCmd),
            "DBIRTH" => Ok(Self::DBirth),
            "DDEATH" => Ok(Self::DDeath),
            "DDATA" => Ok(Self::DData),
            "DCMD" => Ok(Self::DCmd),
            "STATE" => Ok(Self::State),
            _ => Err(DecodeError::InvalidWire(format!(
                "unknown message type: {s}"
            ))),
        }
    }
}

/// A parsed Sparkplug topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    /// `spBv1.0/{group}/{msgtype}/{edge}[/{device}]`
    Sparkplug {
        message_type: MessageType,
        group_id: String,
        edge_node_id: String,
        device_id: Option<String>,
    },
    /// `STATE/{host_id}`
    State { host_id: String },
}

impl Topic {
    /// Parse a topic string.
    ///
    /// # Errors
    ///
    /// Returns error if the topic is not in the Sparkplug B grammar.
    pub fn parse(topic: &str) -> Result<Self, DecodeError> {
        let parts: Vec<&str> = topic.split('/').collect();

        if parts.len() == 2 && parts[0] == STATE_PREFIX {
            return Ok(Self::State {
                host_id: parts[1].to_string(),
            });
        }

        if parts[0] != NAMESPACE {
            return Err(DecodeError::InvalidWire(format!(
                "topic outside {NAMESPACE} namespace: {topic}"
            )));
        }
        if parts.len() < 4 || parts.len() > 5 {
            return Err(DecodeError::InvalidWire(format!(
                "topic must have 4 or 5 segments: {topic}"
            )));
        }

        let group_id = parts[1].to_string();
        let message_type: MessageType = parts[2].parse()?;
        let edge_node_id = parts[3].to_string();
        let device_id = parts.get(4).map(|s| (*s).to_string());

        if message_type.is_device_message() && device_id.is_none() {
            return Err(DecodeError::InvalidWire(format!(
                "{message_type} topic without device id: {topic}"
            )));
        }
        if message_type.is_node_message() && device_id.is_some() {
            return Err(DecodeError::InvalidWire(format!(
                "{message_type} topic with device id: {topic}"
            )));
        }

        Ok(Self::Sparkplug {
            message_type,
            group_id,
            edge_node_id,
            device_id,
        })
    }

    /// Build a node-level topic string.
    #[must_use]
    pub fn node(message_type: MessageType, node: &EdgeNodeDescriptor) -> String {
        format!(
            "{NAMESPACE}/{}/{}/{}",
            node.group_id,
            message_type.as_str(),
            node.edge_node_id
        )
    }

    /// Build a device-level topic string.
    #[must_use]
    pub fn device(message_type: MessageType, device: &DeviceDescriptor) -> String {
        format!(
            "{NAMESPACE}/{}/{}/{}/{}",
            device.edge_node.group_id,
            message_type.as_str(),
            device.edge_node.edge_node_id,
            device.device_id
        )
    }

    /// Build a STATE topic string.
    #[must_use]
    pub fn state(host_id: &str) -> String {
        format!("{STATE_PREFIX}/{host_id}")
    }

    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Self::Sparkplug { message_type, .. } => Some(*message_type),
            Self::State { .. } => None,
        }
    }

    /// The edge node identity, if this is a Sparkplug message topic.
    #[must_use]
    pub fn edge_node(&self) -> Option<EdgeNodeDescriptor> {
        match self {
            Self::Sparkplug {
                group_id,
                edge_node_id,
                ..
            } => Some(EdgeNodeDescriptor::new(group_id, edge_node_id)),
            Self::State { .. } => None,
        }
    }

    /// The device identity, if this is a device message topic.
    #[must_use]
    pub fn device_descriptor(&self) -> Option<DeviceDescriptor> {
        match self {
            Self::Sparkplug {
                group_id,
                edge_node_id,
                device_id: Some(device_id),
                ..
            } => Some(DeviceDescriptor::new(group_id, edge_node_id, device_id)),
            _ => None,
        }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Sparkplug {
                message_type,
                group_id,
                edge_node_id,
                device_id,
            } => {
                write!(
                    f,
                    "{NAMESPACE}/{group_id}/{}/{edge_node_id}",
                    message_type.as_str()
                )?;
                if let Some(device_id) = device_id {
                    write!(f, "/{device_id}")?;
                }
                Ok(())
            }
            Self::State { host_id } => write!(f, "{STATE_PREFIX}/{host_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_topic() {
        let topic = Topic::parse("spBv1.0/Energy/NBIRTH/Gateway01").unwrap();
        assert_eq!(topic.message_type(), Some(MessageType::NBirth));
        assert_eq!(
            topic.edge_node(),
            Some(EdgeNodeDescriptor::new("Energy", "Gateway01"))
        );
        assert_eq!(topic.device_descriptor(), None);
    }

    #[test]
    fn test_parse_device_topic() {
        let topic = Topic::parse("spBv1.0/Plant/DDATA/Node1/Sensor01").unwrap();
        assert_eq!(topic.message_type(), Some(MessageType::DData));
        assert_eq!(
            topic.device_descriptor(),
            Some(DeviceDescriptor::new("Plant", "Node1", "Sensor01"))
        );
    }

    #[test]
    fn test_parse_state_topic() {
        let topic = Topic::parse("STATE/ScadaHost01").unwrap();
        assert_eq!(
            topic,
            Topic::State {
                host_id: "ScadaHost01".to_string()
            }
        );
    }

    #[test]
    fn test_reject_foreign_namespace() {
        assert!(Topic::parse("factory/telemetry/line1").is_err());
        assert!(Topic::parse("spBv2.0/Energy/NDATA/Node1").is_err());
    }

    #[test]
    fn test_device_segment_discipline() {
        assert!(Topic::parse("spBv1.0/Energy/DDATA/Node1").is_err());
        assert!(Topic::parse("spBv1.0/Energy/NDATA/Node1/Dev1").is_err());
        assert!(Topic::parse("spBv1.0/Energy/NDATA/Node1/Dev1/extra").is_err());
    }

    #[test]
    fn test_build_round_trip() {
        let node = EdgeNodeDescriptor::new("Energy", "Gateway01");
        let s = Topic::node(MessageType::NData, &node);
        assert_eq!(s, "spBv1.0/Energy/NDATA/Gateway01");
        assert_eq!(Topic::parse(&s).unwrap().to_string(), s);

        let device = DeviceDescriptor::new("Energy", "Gateway01", "Sensor01");
        let s = Topic::device(MessageType::DCmd, &device);
        assert_eq!(s, "spBv1.0/Energy/DCMD/Gateway01/Sensor01");

        assert_eq!(Topic::state("host1"), "STATE/host1");
    }

    #[test]
    fn test_seq_chain_membership() {
        assert!(!MessageType::NBirth.in_seq_chain());
        assert!(!MessageType::NDeath.in_seq_chain());
        assert!(!MessageType::State.in_seq_chain());
        assert!(MessageType::NData.in_seq_chain());
        assert!(MessageType::DBirth.in_seq_chain());
        assert!(MessageType::DDeath.in_seq_chain());
    }
}
