//! Web page to PDF.
//!
//! # Responsibilities
//! - Refuse URLs that point at the service's own network
//! - Fetch the page under the caller's timeout with a bounded body size
//! - Hand the HTML to the LibreOffice HTML path
//!
//! # Design Decisions
//! - Host names are resolved by [`PublicResolver`], installed as the client's
//!   resolver, so the first request and every redirect hop connect only to
//!   addresses that passed the check
//! - Redirect targets also go through the syntactic guard, which covers
//!   literal addresses that never reach the resolver
//! - Proxies from the environment are ignored
//! - The page body is only ever held in memory until it is written into the
//!   conversion's scratch directory

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
#[cfg(test)]
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use url::{Host, Url};

use crate::transform::office::{self, OfficeTarget};
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};

pub const DEFAULT_FETCH_SECS: u64 = 30;
pub const MIN_FETCH_SECS: u64 = 5;
pub const MAX_FETCH_SECS: u64 = 120;
const MAX_REDIRECTS: usize = 5;

const BLOCKED_DETAIL: &str = "Invalid or blocked URL. Only public HTTP/HTTPS URLs are allowed. \
                              Private IPs, localhost, and internal URLs are blocked.";

/// Substrings that mark a host name as internal.
const INTERNAL_MARKERS: &[&str] = &["localhost", "internal", "local", "intranet"];

fn blocked() -> TransformError {
    TransformError::invalid(BLOCKED_DETAIL)
}

/// Whether `ip` is routable on the public internet.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let shared = a == 100 && (64..128).contains(&b);
    let reserved = a == 0 || a >= 240;
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || shared
        || reserved)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = first & 0xfe00 == 0xfc00;
    let link_local = first & 0xffc0 == 0xfe80;
    let documentation = first == 0x2001 && ip.segments()[1] == 0x0db8;
    !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || unique_local || link_local || documentation)
}

/// Syntactic checks: scheme, host shape, literal addresses and internal names.
pub fn check_url(raw: &str) -> Result<Url, TransformError> {
    let url = Url::parse(raw.trim()).map_err(|_| blocked())?;
    check_parsed(&url)?;
    Ok(url)
}

fn check_parsed(url: &Url) -> Result<(), TransformError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(blocked());
    }
    match url.host() {
        Some(Host::Ipv4(ip)) if is_public_v4(ip) => Ok(()),
        Some(Host::Ipv6(ip)) if is_public_ip(IpAddr::V6(ip)) => Ok(()),
        Some(Host::Domain(name)) => {
            let name = name.to_ascii_lowercase();
            if INTERNAL_MARKERS.iter().any(|marker| name.contains(marker)) {
                Err(blocked())
            } else {
                Ok(())
            }
        }
        _ => Err(blocked()),
    }
}

/// A host resolved to an address outside the public internet.
#[derive(Debug, thiserror::Error)]
#[error("{host} does not resolve to a public address")]
pub struct BlockedAddress {
    host: String,
}

#[derive(Clone)]
enum Lookup {
    System,
    #[cfg(test)]
    Static(Arc<HashMap<String, IpAddr>>),
}

/// DNS resolver that refuses to hand out non-public addresses.
///
/// A host is refused when any of its addresses fails the check, not just
/// the first one tried.
#[derive(Clone)]
pub struct PublicResolver {
    admit: fn(IpAddr) -> bool,
    lookup: Lookup,
}

impl Default for PublicResolver {
    fn default() -> Self {
        Self {
            admit: is_public_ip,
            lookup: Lookup::System,
        }
    }
}

impl PublicResolver {
    async fn addresses(&self, host: &str) -> Result<Vec<SocketAddr>, Box<dyn std::error::Error + Send + Sync>> {
        let addrs: Vec<SocketAddr> = match &self.lookup {
            Lookup::System => tokio::net::lookup_host((host, 0)).await?.collect(),
            #[cfg(test)]
            Lookup::Static(hosts) => hosts.get(host).map(|ip| SocketAddr::new(*ip, 0)).into_iter().collect(),
        };
        if addrs.is_empty() || addrs.iter().any(|addr| !(self.admit)(addr.ip())) {
            return Err(Box::new(BlockedAddress { host: host.to_string() }));
        }
        Ok(addrs)
    }
}

impl Resolve for PublicResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let addrs = resolver.addresses(name.as_str()).await?;
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

fn is_blocked_address(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if inner.downcast_ref::<BlockedAddress>().is_some() {
            return true;
        }
        source = inner.source();
    }
    false
}

/// Prefix the document with a `<base>` element so relative links resolve.
pub fn with_base(html: &[u8], url: &Url) -> Vec<u8> {
    let mut out = format!("<base href=\"{}\">\n", url.as_str()).into_bytes();
    out.extend_from_slice(html);
    out
}

async fn fetch(url: &Url, limit: Duration, max_bytes: usize) -> Result<Vec<u8>, TransformError> {
    fetch_with(url, limit, max_bytes, PublicResolver::default()).await
}

async fn fetch_with(url: &Url, limit: Duration, max_bytes: usize, resolver: PublicResolver) -> Result<Vec<u8>, TransformError> {
    let secs = limit.as_secs();
    let timed_out = || TransformError::Timeout(format!("URL fetch timed out after {secs} seconds"));

    let redirects = reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS || check_parsed(attempt.url()).is_err() {
            attempt.stop()
        } else {
            attempt.follow()
        }
    });
    let client = reqwest::Client::builder()
        .timeout(limit)
        .redirect(redirects)
        .dns_resolver(Arc::new(resolver))
        .no_proxy()
        .user_agent(concat!("notrace-pdf/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|_| TransformError::failure("Failed to prepare URL fetch"))?;

    let response = client.get(url.clone()).send().await.map_err(|err| {
        if is_blocked_address(&err) {
            blocked()
        } else if err.is_timeout() {
            timed_out()
        } else {
            TransformError::invalid("Failed to fetch URL")
        }
    })?;
    let status = response.status();
    if status.is_redirection() {
        return Err(blocked());
    }
    if !status.is_success() {
        return Err(TransformError::invalid(format!("URL returned HTTP status {}", status.as_u16())));
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| {
            if err.is_timeout() {
                timed_out()
            } else {
                TransformError::invalid("Failed to fetch URL")
            }
        })?;
        if body.len() + chunk.len() > max_bytes {
            return Err(TransformError::invalid("Fetched page exceeds the maximum file size"));
        }
        body.extend_from_slice(&chunk);
    }
    if body.is_empty() {
        return Err(TransformError::EmptyResult("Fetched page is empty".into()));
    }
    tracing::debug!("Page fetched");
    Ok(body)
}

/// Fetch a public web page and render it to PDF.
pub struct UrlToPdf;

#[async_trait]
impl Transform for UrlToPdf {
    /// The raw URL as submitted.
    type Input = String;
    /// Fetch timeout.
    type Options = Duration;

    fn operation(&self) -> &'static str {
        "url_to_pdf"
    }

    async fn run(&self, ctx: &TransformContext<'_>, raw: String, limit: Duration) -> Result<TransformResult, TransformError> {
        let url = check_url(&raw)?;
        let html = fetch(&url, limit, ctx.max_upload_bytes()).await?;
        let pdf = office::convert(ctx, &with_base(&html, &url), "html", OfficeTarget::Pdf).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("webpage.pdf", pdf)))
    }
}
