//! Connection-string templates (`vless://user@host:port?sni=...#tag`).
//!
//! The template supplies the latency stage's port and SNI, and is rewritten
//! with each ranked address to produce ready-to-import client configs.
use std::net::IpAddr;
use url::Url;

use crate::error::TemplateError;
use crate::types::ProbeTarget;

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionTemplate {
    url: Url,
    target: ProbeTarget,
}

impl ConnectionTemplate {
    pub fn parse(s: &str) -> Result<Self, TemplateError> {
        let url = Url::parse(s.trim())?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(TemplateError::MissingHost)?
            .to_string();

        let query_value = |key: &str| {
            url.query_pairs()
                .find(|(k, v)| k == key && !v.is_empty())
                .map(|(_, v)| v.into_owned())
        };
        let server_name = query_value("sni")
            .or_else(|| query_value("host"))
            .unwrap_or(host);

        let target = ProbeTarget {
            port: url.port().unwrap_or(ProbeTarget::DEFAULT_PORT),
            server_name,
        };
        Ok(Self { url, target })
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.target
    }

    /// The template with its host swapped for `ip` and its fragment set to `tag`.
    /// User info, port, path and query are kept as-is.
    pub fn render(&self, ip: IpAddr, tag: &str) -> Result<String, TemplateError> {
        let mut url = self.url.clone();
        let host = match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };
        url.set_host(Some(&host))
            .map_err(|_| TemplateError::Substitute(ip.to_string()))?;
        url.set_fragment(Some(tag));
        Ok(url.into())
    }
}

/// Probe target for a run: the template's, or the built-in default when
/// no template was supplied.
pub fn probe_target(template: Option<&ConnectionTemplate>) -> ProbeTarget {
    template.map(|t| t.target().clone()).unwrap_or_default()
}
