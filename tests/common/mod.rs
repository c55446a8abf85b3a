//! Integration test infrastructure: spawn a real server, talk real IRC.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::{sleep, timeout};

/// A spawned coracled instance bound to a loopback port.
pub struct TestServer {
    child: Child,
    port: u16,
    data_dir: tempfile::TempDir,
}

impl TestServer {
    /// Spawn a server with the default test configuration.
    pub async fn spawn(port: u16) -> anyhow::Result<Self> {
        Self::spawn_with(port, "", "{}").await
    }

    /// Spawn a server with extra TOML appended and a datastore document.
    pub async fn spawn_with(
        port: u16,
        extra_config: &str,
        datastore: &str,
    ) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let data_path = data_dir.path().join("data.json");
        std::fs::write(&data_path, datastore)?;

        let config_path = data_dir.path().join("coracled.toml");
        let config = format!(
            r#"
name = "test.coracle"
network = "TestNet"
extensions = ["sasl"]

[clients]
ping_frequency = {{ minutes = 5 }}
ping_timeout = {{ minutes = 5 }}

[data]
path = "{data}"

[[listeners]]
address = "127.0.0.1:{port}"

{extra_config}
"#,
            data = data_path.display(),
        );
        std::fs::write(&config_path, config)?;

        let binary = PathBuf::from(env!("CARGO_BIN_EXE_coracled"));
        let child = Command::new(binary)
            .arg("--config")
            .arg(&config_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let server = Self {
            child,
            port,
            data_dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..100 {
            if TcpStream::connect(self.address()).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server did not start listening on {}", self.address())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A line-oriented IRC test client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Send one raw line (CRLF appended).
    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive one line, trimmed of its terminator.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        self.recv_timeout(Duration::from_secs(30)).await
    }

    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        let mut line = String::new();
        let n = timeout(dur, self.reader.read_line(&mut line)).await??;
        if n == 0 {
            anyhow::bail!("connection closed");
        }
        Ok(line.trim_end().to_string())
    }

    /// Read until a line containing `needle` arrives (registration bursts
    /// and rDNS notices make exact sequences unpredictable).
    pub async fn recv_until(&mut self, needle: &str) -> anyhow::Result<String> {
        loop {
            let line = self.recv().await?;
            if line.contains(needle) {
                return Ok(line);
            }
        }
    }

    /// NICK/USER and wait for the welcome numeric.
    pub async fn register(&mut self, nick: &str) -> anyhow::Result<()> {
        self.send(&format!("NICK {nick}")).await?;
        self.send(&format!("USER {nick} 0 * :{nick}")).await?;
        self.recv_until(" 001 ").await?;
        Ok(())
    }
}
