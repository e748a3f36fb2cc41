//! Minimal async FTP client.
//!
//! Speaks just enough of RFC 959 for single-file transfers: login,
//! binary mode, directory creation, passive-mode `STOR`/`RETR`, `DELE`
//! and `QUIT`.  One [`FtpStream`] is one control connection; every
//! transfer opens its own passive data connection.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// Reply code for "requested action not taken, file unavailable".
pub const FILE_UNAVAILABLE: u16 = 550;

/// A complete (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    fn is_negative(&self) -> bool {
        self.code >= 400
    }
}

#[derive(Debug, Error)]
pub enum FtpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server answered with a code the command does not accept.
    #[error("{command} rejected: {code} {text}")]
    UnexpectedReply {
        command: String,
        code: u16,
        text: String,
    },

    #[error("malformed server reply: {0}")]
    Malformed(String),
}

impl FtpError {
    /// The server reply code, if this error carries one.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            FtpError::UnexpectedReply { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the server reported the file as unavailable (550).
    pub fn is_file_unavailable(&self) -> bool {
        self.reply_code() == Some(FILE_UNAVAILABLE)
    }
}

pub type FtpResult<T> = Result<T, FtpError>;

/// An authenticated-or-not FTP control connection.
pub struct FtpStream {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
}

impl FtpStream {
    /// Connect to `addr` (`host:port`) and consume the server greeting.
    pub async fn connect(addr: &str) -> FtpResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        let peer = stream.peer_addr()?;
        let (read, write) = stream.into_split();
        let mut ftp = Self {
            reader: BufReader::new(read),
            writer: write,
            peer,
        };
        let greeting = ftp.read_reply().await?;
        expect_reply("connect", greeting, &[220])?;
        Ok(ftp)
    }

    /// Authenticate with `USER`/`PASS`.
    pub async fn login(&mut self, user: &str, password: &str) -> FtpResult<()> {
        let reply = self.command(&format!("USER {user}")).await?;
        match reply.code {
            230 => return Ok(()),
            331 | 332 => {}
            _ => return Err(unexpected("USER", reply)),
        }
        let reply = self.send_line(&format!("PASS {password}"), "PASS ****").await?;
        expect_reply("PASS", reply, &[202, 230])?;
        Ok(())
    }

    /// Switch to binary (image) transfer type.
    pub async fn binary(&mut self) -> FtpResult<()> {
        let reply = self.command("TYPE I").await?;
        expect_reply("TYPE", reply, &[200])?;
        Ok(())
    }

    pub async fn cwd(&mut self, dir: &str) -> FtpResult<()> {
        let reply = self.command(&format!("CWD {dir}")).await?;
        expect_reply("CWD", reply, &[200, 250])?;
        Ok(())
    }

    pub async fn mkdir(&mut self, dir: &str) -> FtpResult<()> {
        let reply = self.command(&format!("MKD {dir}")).await?;
        expect_reply("MKD", reply, &[257])?;
        Ok(())
    }

    /// Change into `path`, creating every missing component on the way.
    ///
    /// Leaves the working directory at `path`.
    pub async fn ensure_dir(&mut self, path: &str) -> FtpResult<()> {
        if path.starts_with('/') {
            self.cwd("/").await?;
        }
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            match self.cwd(segment).await {
                Ok(()) => {}
                Err(FtpError::UnexpectedReply { code, .. }) if code >= 500 => {
                    self.mkdir(segment).await?;
                    self.cwd(segment).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Upload `data` as `name` in the working directory.
    pub async fn put(&mut self, name: &str, data: &[u8]) -> FtpResult<()> {
        let mut data_stream = self.passive().await?;
        let reply = self.command(&format!("STOR {name}")).await?;
        expect_reply("STOR", reply, &[125, 150])?;

        data_stream.write_all(data).await?;
        data_stream.shutdown().await?;
        drop(data_stream);

        let reply = self.read_reply().await?;
        expect_reply("STOR", reply, &[226, 250])?;
        Ok(())
    }

    /// Download `name` from the working directory into memory.
    pub async fn retrieve(&mut self, name: &str) -> FtpResult<Vec<u8>> {
        let mut data_stream = self.passive().await?;
        let reply = self.command(&format!("RETR {name}")).await?;
        expect_reply("RETR", reply, &[125, 150])?;

        let mut buf = Vec::new();
        data_stream.read_to_end(&mut buf).await?;
        drop(data_stream);

        let reply = self.read_reply().await?;
        expect_reply("RETR", reply, &[226, 250])?;
        Ok(buf)
    }

    /// Delete `name` from the working directory.
    pub async fn delete(&mut self, name: &str) -> FtpResult<()> {
        let reply = self.command(&format!("DELE {name}")).await?;
        expect_reply("DELE", reply, &[200, 250])?;
        Ok(())
    }

    /// Say goodbye and close the control connection.
    pub async fn quit(mut self) -> FtpResult<()> {
        let reply = self.command("QUIT").await?;
        expect_reply("QUIT", reply, &[200, 221])?;
        self.writer.shutdown().await?;
        Ok(())
    }

    // -- Wire helpers -------------------------------------------------------

    /// Enter passive mode and open the data connection.
    async fn passive(&mut self) -> FtpResult<TcpStream> {
        let reply = self.command("PASV").await?;
        let reply = expect_reply("PASV", reply, &[227])?;
        let mut addr = parse_pasv(&reply.text)?;
        // Servers behind NAT sometimes advertise 0.0.0.0; reuse the control peer.
        if addr.ip().is_unspecified() {
            addr.set_ip(self.peer.ip());
        }
        Ok(TcpStream::connect(addr).await?)
    }

    async fn command(&mut self, line: &str) -> FtpResult<Reply> {
        self.send_line(line, line).await
    }

    /// Send `line`, logging `shown` in its place.
    async fn send_line(&mut self, line: &str, shown: &str) -> FtpResult<Reply> {
        trace!("ftp > {}", shown);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> FtpResult<Reply> {
        let first = self.read_line().await?;
        let (code, sep, text) = split_reply_line(&first)?;
        let mut text = text.to_string();

        if sep == '-' {
            // Multi-line: runs until a line starting with "<code> ".
            let terminator = format!("{code} ");
            loop {
                let line = self.read_line().await?;
                if line.starts_with(&terminator) {
                    text.push('\n');
                    text.push_str(&line[terminator.len()..]);
                    break;
                }
                text.push('\n');
                text.push_str(&line);
            }
        }

        trace!("ftp < {} {}", code, text);
        Ok(Reply { code, text })
    }

    async fn read_line(&mut self) -> FtpResult<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(FtpError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "control connection closed",
            )));
        }
        Ok(line.trim_end_matches(|c| c == '\r' || c == '\n').to_string())
    }
}

fn unexpected(command: &str, reply: Reply) -> FtpError {
    FtpError::UnexpectedReply {
        command: command.to_string(),
        code: reply.code,
        text: reply.text,
    }
}

fn expect_reply(command: &str, reply: Reply, accepted: &[u16]) -> FtpResult<Reply> {
    if accepted.contains(&reply.code) && !reply.is_negative() {
        Ok(reply)
    } else {
        Err(unexpected(command, reply))
    }
}

/// Split `"250-text"` / `"250 text"` / `"250"` into code, separator, text.
fn split_reply_line(line: &str) -> FtpResult<(u16, char, &str)> {
    let code = line
        .get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| FtpError::Malformed(line.to_string()))?;
    match line.as_bytes().get(3) {
        None => Ok((code, ' ', "")),
        Some(b' ') => Ok((code, ' ', &line[4..])),
        Some(b'-') => Ok((code, '-', &line[4..])),
        Some(_) => Err(FtpError::Malformed(line.to_string())),
    }
}

/// Parse the `h1,h2,h3,h4,p1,p2` tuple of a 227 reply.
fn parse_pasv(text: &str) -> FtpResult<SocketAddr> {
    let malformed = || FtpError::Malformed(format!("227 {text}"));

    let start = text
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(malformed)?;
    let tuple: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .collect();
    let nums = tuple
        .split(',')
        .map(|n| n.parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| malformed())?;
    if nums.len() != 6 {
        return Err(malformed());
    }

    let ip = IpAddr::V4(Ipv4Addr::new(nums[0], nums[1], nums[2], nums[3]));
    let port = u16::from(nums[4]) << 8 | u16::from(nums[5]);
    Ok(SocketAddr::new(ip, port))
}

// ── Test server ─────────────────────────────────────────────────────


// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::fake_server::FakeFtpServer;
    use super::*;

    #[test]
    fn test_split_reply_line() {
        assert_eq!(split_reply_line("220 ready").unwrap(), (220, ' ', "ready"));
        assert_eq!(split_reply_line("220-hello").unwrap(), (220, '-', "hello"));
        assert_eq!(split_reply_line("221").unwrap(), (221, ' ', ""));
        assert!(split_reply_line("hello").is_err());
        assert!(split_reply_line("22").is_err());
        assert!(split_reply_line("220x").is_err());
    }

    #[test]
    fn test_parse_pasv() {
        let addr = parse_pasv("Entering Passive Mode (192,168,1,20,195,80).").unwrap();
        assert_eq!(addr, "192.168.1.20:50000".parse().unwrap());

        // Some servers omit the parentheses.
        let addr = parse_pasv("Entering Passive Mode 10,0,0,1,0,21").unwrap();
        assert_eq!(addr, "10.0.0.1:21".parse().unwrap());

        assert!(parse_pasv("Entering Passive Mode").is_err());
        assert!(parse_pasv("(1,2,3,4,5)").is_err());
        assert!(parse_pasv("(1,2,3,4,5,999)").is_err());
    }

    #[test]
    fn test_file_unavailable_detection() {
        let err = FtpError::UnexpectedReply {
            command: "RETR".to_string(),
            code: 550,
            text: "file unavailable".to_string(),
        };
        assert!(err.is_file_unavailable());
        assert!(!FtpError::Malformed("x".to_string()).is_file_unavailable());
    }

    #[tokio::test]
    async fn test_session_put_retrieve_delete() {
        let server = FakeFtpServer::start("alice", "s3cret").await;
        let mut ftp = FtpStream::connect(&server.addr.to_string()).await.unwrap();
        ftp.login("alice", "s3cret").await.unwrap();
        ftp.binary().await.unwrap();
        ftp.ensure_dir("/upload/blobs").await.unwrap();

        ftp.put("one", b"first file").await.unwrap();
        assert_eq!(ftp.retrieve("one").await.unwrap(), b"first file");
        assert!(server
            .state
            .lock()
            .unwrap()
            .files
            .contains_key("/upload/blobs/one"));

        ftp.delete("one").await.unwrap();
        let err = ftp.retrieve("one").await.unwrap_err();
        assert!(err.is_file_unavailable());

        ftp.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = FakeFtpServer::start("alice", "s3cret").await;
        let mut ftp = FtpStream::connect(&server.addr.to_string()).await.unwrap();
        let err = ftp.login("alice", "wrong").await.unwrap_err();
        assert_eq!(err.reply_code(), Some(530));
    }

    #[tokio::test]
    async fn test_ensure_dir_existing_is_noop() {
        let server = FakeFtpServer::start("u", "p").await;
        let mut ftp = FtpStream::connect(&server.addr.to_string()).await.unwrap();
        ftp.login("u", "p").await.unwrap();
        ftp.ensure_dir("/a/b").await.unwrap();
        ftp.ensure_dir("/a/b").await.unwrap();
        ftp.ensure_dir("/").await.unwrap();

        let dirs = server.state.lock().unwrap().dirs.clone();
        assert!(dirs.contains("/a"));
        assert!(dirs.contains("/a/b"));
        assert_eq!(dirs.len(), 3);
    }
}
