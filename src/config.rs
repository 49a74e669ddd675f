//! Server configuration consumed by the trace filter.
//!
//! The filter does not read configuration files itself; the hosting server
//! resolves its registry and hands the relevant slice over as a
//! [`ServerConfig`]. The shape mirrors what a TARS server knows about
//! itself: a trace sample rate, the local IP it reports, and one adapter
//! endpoint per hosted servant.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Process-wide decision whether inbound calls are traced at all.
///
/// Computed once from the configured sample rate when the filter is
/// initialized, then read-only. Reconfiguration means re-running
/// [`Filter::init`](crate::filter::Filter::init), which recomputes the gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplingGate {
    enabled: bool,
}

impl SamplingGate {
    /// Derive the gate from a configured sample rate. Any positive rate
    /// enables tracing.
    pub fn from_rate(rate: f64) -> Self {
        SamplingGate { enabled: rate > 0.0 }
    }

    /// Whether inbound calls should be traced.
    pub fn should_trace(&self) -> bool {
        self.enabled
    }
}

/// Transport protocol of an adapter endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// Plain TCP.
    Tcp,
    /// UDP.
    Udp,
    /// TLS over TCP.
    Ssl,
}

/// The listening endpoint bound to one servant.
///
/// Endpoints are configured in the TARS flag-string form, e.g.
/// `"tcp -h 10.0.0.1 -p 18601 -t 3000 -s gray"`, and parse via [`FromStr`].
/// Unknown flags are tolerated so newer registry fields do not break older
/// servers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterEndpoint {
    protocol: Protocol,
    host: String,
    port: u16,
    timeout: Option<Duration>,
    set_division: String,
}

impl AdapterEndpoint {
    /// Create a TCP endpoint with no set division.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        AdapterEndpoint {
            protocol: Protocol::Tcp,
            host: host.into(),
            port,
            timeout: None,
            set_division: String::new(),
        }
    }

    /// Attach the deployment set division this endpoint belongs to.
    pub fn with_set_division(mut self, set_division: impl Into<String>) -> Self {
        self.set_division = set_division.into();
        self
    }

    /// The endpoint's transport protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Host address the adapter listens on.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the adapter listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Queue timeout configured for the adapter, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Deployment set division; empty when the server is not deployed in a
    /// set.
    pub fn set_division(&self) -> &str {
        &self.set_division
    }
}

/// Failure to parse a TARS endpoint flag string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointParseError {
    /// The endpoint string contained no tokens.
    #[error("endpoint string is empty")]
    Empty,
    /// The leading protocol token was not one of `tcp`, `udp`, `ssl`.
    #[error("unknown endpoint protocol `{0}`")]
    UnknownProtocol(String),
    /// A flag was present without a following value.
    #[error("endpoint flag `{0}` is missing a value")]
    MissingValue(String),
    /// The `-p` value was not a valid port number.
    #[error("invalid endpoint port `{0}`")]
    InvalidPort(String),
    /// No `-h <host>` flag was present.
    #[error("endpoint is missing `-h <host>`")]
    MissingHost,
    /// No `-p <port>` flag was present.
    #[error("endpoint is missing `-p <port>`")]
    MissingPort,
}

impl FromStr for AdapterEndpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace();
        let protocol = match tokens.next() {
            Some("tcp") => Protocol::Tcp,
            Some("udp") => Protocol::Udp,
            Some("ssl") => Protocol::Ssl,
            Some(other) => return Err(EndpointParseError::UnknownProtocol(other.to_owned())),
            None => return Err(EndpointParseError::Empty),
        };

        let mut host = None;
        let mut port = None;
        let mut timeout = None;
        let mut set_division = String::new();
        while let Some(flag) = tokens.next() {
            let value = tokens
                .next()
                .ok_or_else(|| EndpointParseError::MissingValue(flag.to_owned()))?;
            match flag {
                "-h" => host = Some(value.to_owned()),
                "-p" => {
                    port = Some(
                        value
                            .parse()
                            .map_err(|_| EndpointParseError::InvalidPort(value.to_owned()))?,
                    )
                }
                "-t" => timeout = value.parse().ok().map(Duration::from_millis),
                "-s" => set_division = value.to_owned(),
                // -e, -g, -q, -w and friends are registry concerns
                _ => {}
            }
        }

        Ok(AdapterEndpoint {
            protocol,
            host: host.ok_or(EndpointParseError::MissingHost)?,
            port: port.ok_or(EndpointParseError::MissingPort)?,
            timeout,
            set_division,
        })
    }
}

/// The server-side configuration slice the trace filter reads.
///
/// Built once at startup and shared immutably with the filter; per-call
/// handling never mutates it.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    sample_rate: f64,
    local_ip: String,
    adapters: HashMap<String, AdapterEndpoint>,
}

impl ServerConfig {
    /// Start building a configuration.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Configured trace sample rate. Zero disables tracing.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// The IP address this server reports as its identity.
    pub fn local_ip(&self) -> &str {
        &self.local_ip
    }

    /// The adapter endpoint serving `servant`, if one is configured.
    ///
    /// Absence is a normal condition (e.g. dynamically registered servants);
    /// callers omit endpoint-derived span tags in that case.
    pub fn adapter(&self, servant: &str) -> Option<&AdapterEndpoint> {
        self.adapters.get(servant)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Clone, Debug, Default)]
pub struct ServerConfigBuilder {
    sample_rate: f64,
    local_ip: Option<String>,
    adapters: HashMap<String, AdapterEndpoint>,
}

impl ServerConfigBuilder {
    /// Set the trace sample rate.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the IP address reported in span tags.
    pub fn with_local_ip(mut self, local_ip: impl Into<String>) -> Self {
        self.local_ip = Some(local_ip.into());
        self
    }

    /// Register the adapter endpoint serving `servant`.
    pub fn with_adapter(
        mut self,
        servant: impl Into<String>,
        endpoint: AdapterEndpoint,
    ) -> Self {
        self.adapters.insert(servant.into(), endpoint);
        self
    }

    /// Finish the configuration.
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            sample_rate: self.sample_rate,
            local_ip: self.local_ip.unwrap_or_else(|| "127.0.0.1".to_owned()),
            adapters: self.adapters,
        }
    }
}
