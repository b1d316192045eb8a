//! Structured logging setup and W3C trace-context plumbing.
//!
//! Log output is `tracing` + `tracing-subscriber`, JSON by default for
//! log-collector environments and pretty for development. Trace-context
//! support is limited to what a gateway needs: parse the inbound
//! `traceparent`, open a server span carrying the ids, and hand the
//! forwarder a child context to inject upstream. Exporter wiring is the
//! embedding environment's business.
use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::models::{LogConfig, LogFormat};

/// Initialize the global subscriber from the log configuration.
pub fn init_tracing(log: &LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .wrap_err_with(|| format!("invalid log level: {}", log.level))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match log.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(false)
                    .with_span_list(true),
            )
            .init(),
        LogFormat::Pretty => Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .init(),
    }

    Ok(())
}

const TRACEPARENT_VERSION: &str = "00";

/// W3C trace context as carried by the `traceparent` header.
///
/// Stored in request extensions by the tracing middleware so the forwarder
/// can inject the outbound header without re-parsing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// 32 lowercase hex chars, non-zero.
    pub trace_id: String,
    /// 16 lowercase hex chars, non-zero; the id of *our* span.
    pub span_id: String,
    pub sampled: bool,
}

impl TraceContext {
    /// Parse an inbound `traceparent` header value.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;

        if version.len() != 2 || flags.len() != 2 {
            return None;
        }
        if trace_id.len() != 32 || !is_lower_hex(trace_id) || trace_id.bytes().all(|b| b == b'0') {
            return None;
        }
        if parent_id.len() != 16 || !is_lower_hex(parent_id) || parent_id.bytes().all(|b| b == b'0')
        {
            return None;
        }

        let sampled = u8::from_str_radix(flags, 16).ok()? & 0x01 == 0x01;
        Some(Self {
            trace_id: trace_id.to_string(),
            span_id: parent_id.to_string(),
            sampled,
        })
    }

    /// Start a fresh trace at this gateway.
    pub fn new_root() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            sampled: true,
        }
    }

    /// Derive the child context for the gateway's own span within an
    /// inbound trace.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            sampled: self.sampled,
        }
    }

    /// Render the outbound `traceparent` header value.
    pub fn to_traceparent(&self) -> String {
        let flags = if self.sampled { "01" } else { "00" };
        format!(
            "{TRACEPARENT_VERSION}-{}-{}-{flags}",
            self.trace_id, self.span_id
        )
    }
}

fn new_span_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..16].to_string()
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Create the server span for one request.
pub fn create_request_span(
    service_name: &str,
    method: &str,
    path: &str,
    trace: &TraceContext,
) -> tracing::Span {
    tracing::info_span!(
        "request",
        otel.name = service_name,
        http.method = method,
        http.path = path,
        trace_id = %trace.trace_id,
        span_id = %trace.span_id,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_traceparent() {
        let ctx =
            TraceContext::parse("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01").unwrap();
        assert_eq!(ctx.trace_id, "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(ctx.span_id, "b7ad6b7169203331");
        assert!(ctx.sampled);
    }

    #[test]
    fn test_parse_unsampled_flag() {
        let ctx =
            TraceContext::parse("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-00").unwrap();
        assert!(!ctx.sampled);
    }

    #[test]
    fn test_parse_rejects_malformed_values() {
        assert!(TraceContext::parse("").is_none());
        assert!(TraceContext::parse("not-a-traceparent").is_none());
        // W3C forbids the all-zero trace id.
        assert!(
            TraceContext::parse("00-00000000000000000000000000000000-b7ad6b7169203331-01")
                .is_none()
        );
        // Uppercase hex is invalid.
        assert!(
            TraceContext::parse("00-0AF7651916CD43DD8448EB211C80319C-b7ad6b7169203331-01")
                .is_none()
        );
    }

    #[test]
    fn test_child_keeps_trace_id_with_new_span() {
        let root = TraceContext::new_root();
        let child = root.child();
        assert_eq!(child.trace_id, root.trace_id);
        assert_ne!(child.span_id, root.span_id);
        assert_eq!(child.span_id.len(), 16);
    }

    #[test]
    fn test_to_traceparent_round_trips() {
        let ctx = TraceContext::new_root();
        let parsed = TraceContext::parse(&ctx.to_traceparent()).unwrap();
        assert_eq!(parsed, ctx);
    }
}
