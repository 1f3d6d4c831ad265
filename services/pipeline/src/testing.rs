//! In-process Redis stand-in for tests.
//!
//! Speaks just enough RESP2 for [`RedisQueue`](crate::RedisQueue): `PING`,
//! `RPUSH` and `BLPOP` with a timeout. Every other command answers `+OK`.
//! Each received command is recorded so tests can wait for a consumer to park.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

#[derive(Default)]
struct State {
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    pushed: Notify,
    commands: Mutex<Vec<Vec<String>>>,
}

/// Redis server on an ephemeral localhost port
pub struct FakeRedis {
    addr: SocketAddr,
    state: Arc<State>,
}

impl FakeRedis {
    pub async fn start() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(State::default());

        tokio::spawn({
            let state = state.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(stream, state.clone()));
                }
            }
        });

        Ok(Self { addr, state })
    }

    pub fn uri(&self) -> String {
        format!("redis://{}", self.addr)
    }

    /// Append to a list as another client would, waking parked `BLPOP`s
    pub fn push(&self, key: &str, payload: impl Into<Vec<u8>>) {
        self.state.push(key, payload.into());
    }

    pub fn len(&self, key: &str) -> usize {
        self.state.lists.lock().get(key).map_or(0, VecDeque::len)
    }

    /// Arguments of the most recent `name` command, name first
    pub fn last_command(&self, name: &str) -> Option<Vec<String>> {
        self.state
            .commands
            .lock()
            .iter()
            .rev()
            .find(|args| args.first().map(String::as_str) == Some(name))
            .cloned()
    }

    /// Poll until `name` has been received, up to `timeout`
    pub async fn wait_for_command(&self, name: &str, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.last_command(name).is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

impl State {
    fn push(&self, key: &str, payload: Vec<u8>) -> usize {
        let len = {
            let mut lists = self.lists.lock();
            let list = lists.entry(key.to_string()).or_default();
            list.push_back(payload);
            list.len()
        };
        self.pushed.notify_waiters();
        len
    }

    fn pop(&self, key: &str) -> Option<Vec<u8>> {
        self.lists.lock().get_mut(key).and_then(VecDeque::pop_front)
    }

    async fn execute(&self, args: Vec<Vec<u8>>) -> Vec<u8> {
        let text: Vec<String> = args
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect();
        let name = text.first().map(|n| n.to_uppercase()).unwrap_or_default();

        let mut recorded = text.clone();
        if let Some(first) = recorded.first_mut() {
            first.clone_from(&name);
        }
        self.commands.lock().push(recorded);

        match name.as_str() {
            "PING" => b"+PONG\r\n".to_vec(),
            "RPUSH" if args.len() >= 3 => {
                let mut len = 0;
                for payload in &args[2..] {
                    len = self.push(&text[1], payload.clone());
                }
                format!(":{len}\r\n").into_bytes()
            }
            "BLPOP" if args.len() >= 3 => {
                let secs: f64 = text[text.len() - 1].parse().unwrap_or(0.0);
                self.blpop(&text[1], secs).await
            }
            _ => b"+OK\r\n".to_vec(),
        }
    }

    async fn blpop(&self, key: &str, secs: f64) -> Vec<u8> {
        let deadline = (secs > 0.0)
            .then(|| tokio::time::Instant::now() + Duration::from_secs_f64(secs));

        loop {
            let pushed = self.pushed.notified();

            if let Some(payload) = self.pop(key) {
                let mut reply = b"*2\r\n".to_vec();
                write_bulk(&mut reply, key.as_bytes());
                write_bulk(&mut reply, &payload);
                return reply;
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, pushed).await.is_err() {
                        return b"*-1\r\n".to_vec();
                    }
                }
                None => pushed.await,
            }
        }
    }
}

fn write_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

async fn serve(stream: TcpStream, state: Arc<State>) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    while let Some(args) = read_command(&mut reader).await? {
        let reply = state.execute(args).await;
        write.write_all(&reply).await?;
    }

    Ok(())
}

/// One client command: an array of bulk strings
async fn read_command<R>(reader: &mut R) -> io::Result<Option<Vec<Vec<u8>>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let count = parse_header(&line, '*')?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await?;
        let len = parse_header(&line, '$')?;

        let mut arg = vec![0; len + 2];
        reader.read_exact(&mut arg).await?;
        arg.truncate(len);
        args.push(arg);
    }

    Ok(Some(args))
}

fn parse_header(line: &str, prefix: char) -> io::Result<usize> {
    line.trim_end()
        .strip_prefix(prefix)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected RESP line: {line:?}"),
            )
        })
}
