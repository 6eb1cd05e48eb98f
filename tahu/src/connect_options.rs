// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use rumqttc::QoS;

use crate::error::{Error, ErrorKind};

/// Generate random string.
pub fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A message published by the supervisor on session boundaries: the BIRTH
/// on connect, the LWT registered with the broker.
#[derive(Debug, Clone)]
pub struct SessionMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl SessionMessage {
    #[must_use]
    pub fn new(topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Self {
        Self {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        }
    }
}

/// Options of one logical MQTT session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    server_name: String,
    server_url: String,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    clean_session: bool,
    keep_alive: Duration,
    connect_timeout: Duration,
    connect_retry_interval: Duration,
    auto_reconnect: bool,
    max_inflight: u16,
    random_startup_delay: Option<Duration>,
    birth: Option<SessionMessage>,
    lwt: Option<SessionMessage>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            server_name: "Mqtt Server One".to_string(),
            server_url: "tcp://127.0.0.1:1883".to_string(),
            client_id: random_string(12),
            username: None,
            password: None,
            clean_session: true,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            connect_retry_interval: Duration::from_secs(10),
            auto_reconnect: true,
            max_inflight: 10,
            random_startup_delay: None,
            birth: None,
            lwt: None,
        }
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new(server_name: &str, server_url: &str, client_id: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            server_url: server_url.to_string(),
            client_id: client_id.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_credentials(&mut self, username: &str, password: &str) -> &mut Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn set_keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) -> &mut Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn set_connect_retry_interval(&mut self, interval: Duration) -> &mut Self {
        self.connect_retry_interval = interval;
        self
    }

    #[must_use]
    pub const fn connect_retry_interval(&self) -> Duration {
        self.connect_retry_interval
    }

    pub fn set_auto_reconnect(&mut self, auto_reconnect: bool) -> &mut Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    #[must_use]
    pub const fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn set_max_inflight(&mut self, max_inflight: u16) -> &mut Self {
        self.max_inflight = max_inflight;
        self
    }

    #[must_use]
    pub const fn max_inflight(&self) -> u16 {
        self.max_inflight
    }

    /// A uniform random delay in `[0, max)` applied once before the first
    /// connect attempt, to spread fleet reconnect storms.
    pub fn set_random_startup_delay(&mut self, max: Duration) -> &mut Self {
        self.random_startup_delay = Some(max);
        self
    }

    #[must_use]
    pub const fn random_startup_delay(&self) -> Option<Duration> {
        self.random_startup_delay
    }

    pub fn set_birth(&mut self, birth: SessionMessage) -> &mut Self {
        self.birth = Some(birth);
        self
    }

    #[must_use]
    pub const fn birth(&self) -> Option<&SessionMessage> {
        self.birth.as_ref()
    }

    pub fn set_lwt(&mut self, lwt: SessionMessage) -> &mut Self {
        self.lwt = Some(lwt);
        self
    }

    #[must_use]
    pub const fn lwt(&self) -> Option<&SessionMessage> {
        self.lwt.as_ref()
    }

    /// Split the server url into `(host, port)`.
    ///
    /// Accepts `tcp://host:port` and `mqtt://host:port`.
    ///
    /// # Errors
    ///
    /// Returns error if the url scheme is unsupported or the port is
    /// missing or unparsable.
    pub fn parse_server_url(&self) -> Result<(String, u16), Error> {
        let rest = self
            .server_url
            .strip_prefix("tcp://")
            .or_else(|| self.server_url.strip_prefix("mqtt://"))
            .ok_or_else(|| {
                Error::from_string(
                    ErrorKind::InvalidArgument,
                    format!("Unsupported server url: {}", self.server_url),
                )
            })?;

        let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
            Error::from_string(
                ErrorKind::InvalidArgument,
                format!("Server url without port: {}", self.server_url),
            )
        })?;
        if host.is_empty() {
            return Err(Error::from_string(
                ErrorKind::InvalidArgument,
                format!("Server url without host: {}", self.server_url),
            ));
        }
        let port: u16 = port.parse().map_err(|_| {
            Error::from_string(
                ErrorKind::InvalidArgument,
                format!("Invalid port in server url: {}", self.server_url),
            )
        })?;

        Ok((host.to_string(), port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_url() {
        let options = ConnectOptions::new("local", "tcp://broker.local:1883", "edge-1");
        assert_eq!(
            options.parse_server_url().unwrap(),
            ("broker.local".to_string(), 1883)
        );

        let options = ConnectOptions::new("local", "mqtt://10.0.0.2:8883", "edge-1");
        assert_eq!(
            options.parse_server_url().unwrap(),
            ("10.0.0.2".to_string(), 8883)
        );
    }

    #[test]
    fn test_reject_bad_urls() {
        for url in ["ws://broker:1883", "broker:1883", "tcp://broker", "tcp://:1883", "tcp://broker:port"] {
            let options = ConnectOptions::new("local", url, "edge-1");
            assert!(options.parse_server_url().is_err(), "accepted {url}");
        }
    }

    #[test]
    fn test_random_string_length() {
        assert_eq!(random_string(12).len(), 12);
    }

    #[test]
    fn test_defaults() {
        let options = ConnectOptions::default();
        assert!(options.clean_session());
        assert!(options.auto_reconnect());
        assert_eq!(options.max_inflight(), 10);
        assert_eq!(options.connect_timeout(), Duration::from_secs(30));
    }
}
