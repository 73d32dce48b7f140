// src/instance/control.rs

//! Control-protocol client for a live instance.
//!
//! Redis speaks RESP; the agent only needs four commands (PING, INFO,
//! SHUTDOWN, REPLICAOF NO ONE), so this is a deliberately small client: one
//! TCP connection per command, a reply reader covering the simple-string /
//! error / integer / bulk-string cases, and nothing else.
//!
//! `SHUTDOWN` is special: on success the server exits without replying, so a
//! closed connection counts as success there.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::descriptor::InstanceAddress;
use crate::errors::{AgentError, Result};

/// Commands the agent issues to a running instance.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Fetch one INFO section (`memory`, `cpu`, `stats`, `replication`, ...).
    async fn info(&self, section: &str) -> Result<String>;

    /// Ask the instance to shut itself down gracefully.
    async fn shutdown(&self) -> Result<()>;

    /// Promote a replica to primary.
    async fn promote(&self) -> Result<()>;
}

/// Creates a control channel for a given instance address.
pub trait ControlFactory: Send + Sync {
    fn channel_for(&self, addr: &InstanceAddress) -> Arc<dyn ControlChannel>;
}

/// One parsed RESP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespReply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(String),
    Nil,
    /// The server closed the connection without replying.
    Closed,
}

/// Production control channel: RESP over TCP, one connection per command.
pub struct RespControl {
    addr: String,
}

impl RespControl {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    async fn request(&self, parts: &[&str]) -> Result<RespReply> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.write_all(&encode_command(parts)).await?;
        stream.flush().await?;
        let mut reader = BufReader::new(stream);
        read_reply(&mut reader).await
    }
}

#[async_trait]
impl ControlChannel for RespControl {
    async fn ping(&self) -> Result<()> {
        match self.request(&["PING"]).await? {
            RespReply::Simple(s) if s.eq_ignore_ascii_case("PONG") => Ok(()),
            other => Err(AgentError::Control(format!(
                "unexpected PING reply: {other:?}"
            ))),
        }
    }

    async fn info(&self, section: &str) -> Result<String> {
        match self.request(&["INFO", section]).await? {
            RespReply::Bulk(body) => Ok(body),
            RespReply::Error(e) => Err(AgentError::Control(format!("INFO {section}: {e}"))),
            other => Err(AgentError::Control(format!(
                "unexpected INFO reply: {other:?}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        match self.request(&["SHUTDOWN", "NOSAVE"]).await {
            // The server exits without replying on a successful shutdown.
            Ok(RespReply::Closed) => Ok(()),
            Ok(RespReply::Error(e)) => Err(AgentError::GracefulStop(e)),
            Ok(_) => Ok(()),
            Err(e) => Err(AgentError::GracefulStop(e.to_string())),
        }
    }

    async fn promote(&self) -> Result<()> {
        match self.request(&["REPLICAOF", "NO", "ONE"]).await? {
            RespReply::Simple(_) => Ok(()),
            RespReply::Error(e) => Err(AgentError::Control(format!("REPLICAOF NO ONE: {e}"))),
            other => Err(AgentError::Control(format!(
                "unexpected REPLICAOF reply: {other:?}"
            ))),
        }
    }
}

/// Factory handing out [`RespControl`] channels.
#[derive(Debug, Default)]
pub struct RespControlFactory;

impl ControlFactory for RespControlFactory {
    fn channel_for(&self, addr: &InstanceAddress) -> Arc<dyn ControlChannel> {
        Arc::new(RespControl::new(addr.to_string()))
    }
}

fn encode_command(parts: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        buf.extend_from_slice(part.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<RespReply> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(RespReply::Closed);
    }
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(payload) = line.get(1..) else {
        return Err(AgentError::Control("empty reply line".to_string()));
    };

    match line.as_bytes()[0] {
        b'+' => Ok(RespReply::Simple(payload.to_string())),
        b'-' => Ok(RespReply::Error(payload.to_string())),
        b':' => {
            let n = payload
                .parse::<i64>()
                .map_err(|_| AgentError::Control(format!("bad integer reply '{payload}'")))?;
            Ok(RespReply::Integer(n))
        }
        b'$' => {
            let len = payload
                .parse::<i64>()
                .map_err(|_| AgentError::Control(format!("bad bulk length '{payload}'")))?;
            if len < 0 {
                return Ok(RespReply::Nil);
            }
            // Bulk payload plus trailing CRLF.
            let mut body = vec![0u8; len as usize + 2];
            reader.read_exact(&mut body).await?;
            body.truncate(len as usize);
            let body = String::from_utf8(body)
                .map_err(|_| AgentError::Control("non-utf8 bulk reply".to_string()))?;
            Ok(RespReply::Bulk(body))
        }
        other => Err(AgentError::Control(format!(
            "unsupported reply type byte '{}'",
            other as char
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(bytes: &[u8]) -> Result<RespReply> {
        let mut reader = BufReader::new(bytes);
        read_reply(&mut reader).await
    }

    #[tokio::test]
    async fn parses_simple_and_error_replies() {
        assert_eq!(
            parse(b"+PONG\r\n").await.unwrap(),
            RespReply::Simple("PONG".to_string())
        );
        assert_eq!(
            parse(b"-ERR unknown command\r\n").await.unwrap(),
            RespReply::Error("ERR unknown command".to_string())
        );
    }

    #[tokio::test]
    async fn parses_integer_bulk_and_nil() {
        assert_eq!(parse(b":42\r\n").await.unwrap(), RespReply::Integer(42));
        assert_eq!(
            parse(b"$5\r\nhello\r\n").await.unwrap(),
            RespReply::Bulk("hello".to_string())
        );
        assert_eq!(parse(b"$-1\r\n").await.unwrap(), RespReply::Nil);
    }

    #[tokio::test]
    async fn closed_connection_reads_as_closed() {
        assert_eq!(parse(b"").await.unwrap(), RespReply::Closed);
    }

    #[tokio::test]
    async fn bulk_reply_may_span_lines() {
        assert_eq!(
            parse(b"$11\r\nline1\nline2\r\n").await.unwrap(),
            RespReply::Bulk("line1\nline2".to_string())
        );
    }

    #[test]
    fn encodes_commands_as_resp_arrays() {
        assert_eq!(encode_command(&["PING"]), b"*1\r\n$4\r\nPING\r\n");
        assert_eq!(
            encode_command(&["INFO", "memory"]),
            b"*2\r\n$4\r\nINFO\r\n$6\r\nmemory\r\n"
        );
    }
}
