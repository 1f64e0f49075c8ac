//! SOCKS5 client handshake (RFC 1928 subset).
//!
//! No-auth method, CONNECT command, domain-name addressing only. That is all
//! Tor's SOCKS port needs to reach an onion service.

use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;
const REPLY_SUCCEEDED: u8 = 0x00;

/// Human-readable meaning of a SOCKS5 reply code.
pub fn reply_message(code: u8) -> &'static str {
    match code {
        0x00 => "succeeded",
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        // Tor extensions for onion services
        0xf0 => "onion service descriptor can not be found",
        0xf1 => "onion service descriptor is invalid",
        0xf2 => "onion service introduction failed",
        0xf3 => "onion service rendezvous failed",
        0xf4 => "onion service missing client authorization",
        0xf5 => "onion service wrong client authorization",
        0xf6 => "onion service invalid address",
        0xf7 => "onion service introduction timed out",
        _ => "unknown reply code",
    }
}

/// Build the CONNECT request for `host:port` using domain-name addressing.
pub fn connect_request(host: &str, port: u16) -> Result<Vec<u8>> {
    let hostname_bytes = host.as_bytes();
    if hostname_bytes.is_empty() || hostname_bytes.len() > 255 {
        return Err(Error::Socks(format!(
            "hostname must be 1..=255 bytes, got {}",
            hostname_bytes.len()
        )));
    }

    let mut request = Vec::with_capacity(7 + hostname_bytes.len());
    request.push(SOCKS_VERSION);
    request.push(CMD_CONNECT);
    request.push(0x00); // Reserved
    request.push(ATYP_DOMAIN);
    request.push(hostname_bytes.len() as u8);
    request.extend_from_slice(hostname_bytes);
    request.extend_from_slice(&port.to_be_bytes());
    Ok(request)
}

/// Run the SOCKS5 handshake on an already connected proxy stream.
///
/// On success the stream is positioned at the first byte of tunnelled data.
pub async fn socks5_connect<S>(stream: &mut S, host: &str, port: u16) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = connect_request(host, port)?;

    // Version 5, 1 auth method, no auth
    stream
        .write_all(&[SOCKS_VERSION, 0x01, METHOD_NO_AUTH])
        .await
        .map_err(|e| Error::Socks(format!("greeting failed: {}", e)))?;

    let mut response = [0u8; 2];
    read_reply(stream, &mut response).await?;
    if response != [SOCKS_VERSION, METHOD_NO_AUTH] {
        return Err(Error::Socks(format!(
            "proxy rejected no-auth method (reply {:02x} {:02x})",
            response[0], response[1]
        )));
    }

    stream
        .write_all(&request)
        .await
        .map_err(|e| Error::Socks(format!("connect request failed: {}", e)))?;

    // VER REP RSV ATYP
    let mut header = [0u8; 4];
    read_reply(stream, &mut header).await?;

    if header[0] != SOCKS_VERSION {
        return Err(Error::Socks(format!(
            "invalid version in connect reply: {:#04x}",
            header[0]
        )));
    }

    if header[1] != REPLY_SUCCEEDED {
        return Err(Error::Socks(format!(
            "connect failed with code {:#04x} ({})",
            header[1],
            reply_message(header[1])
        )));
    }

    // Bound address and port: ignored, but must be consumed
    let bound_len = match header[3] {
        ATYP_IPV4 => 4 + 2,
        ATYP_IPV6 => 16 + 2,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            read_reply(stream, &mut len).await?;
            len[0] as usize + 2
        }
        other => {
            return Err(Error::Socks(format!(
                "invalid address type in connect reply: {:#04x}",
                other
            )))
        }
    };
    let mut bound = vec![0u8; bound_len];
    read_reply(stream, &mut bound).await?;

    debug!(port, "SOCKS5 tunnel established");
    Ok(())
}

async fn read_reply<S>(stream: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    stream.read_exact(buf).await.map(|_| ()).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Socks("proxy closed the connection during handshake".into())
        } else {
            Error::Socks(format!("reading proxy reply failed: {}", e))
        }
    })
}
