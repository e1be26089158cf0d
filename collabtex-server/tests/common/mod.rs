use std::net::SocketAddr;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

/// A raw line-protocol client for driving the server in tests: write a
/// `&key=val&`-framed request line, read back whatever line(s) the
/// dispatcher broadcasts next.
pub struct LineClient {
    write: tokio::net::tcp::OwnedWriteHalf,
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
}

impl LineClient {
    async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read, write) = stream.into_split();
        Ok(Self {
            write,
            lines: BufReader::new(read).lines(),
        })
    }

    pub async fn send(&mut self, line: &str) -> Result<()> {
        self.write.write_all(line.as_bytes()).await?;
        self.write.write_all(b"\n").await?;
        Ok(())
    }

    /// Reads the next line from the socket. The server frames one response
    /// per line, except for the two responses that embed an extra
    /// `\n`-separated docinfo block; callers that care about those read
    /// twice.
    pub async fn recv(&mut self) -> Result<String> {
        self.lines
            .next_line()
            .await?
            .ok_or_else(|| anyhow!("connection closed"))
    }
}

/// Starts the server on an ephemeral port and returns its address.
pub async fn start_server() -> Result<SocketAddr> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(collabtex_server::serve_on(listener));
    Ok(addr)
}

pub async fn connect(addr: SocketAddr) -> Result<LineClient> {
    let mut client = LineClient::connect(addr).await?;
    // Handshake: the server sends `id&id=<n>&` unprompted on connect.
    let handshake = client.recv().await?;
    assert!(handshake.starts_with("id&id="), "unexpected handshake: {handshake}");
    Ok(client)
}
