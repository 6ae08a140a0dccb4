//! # TCP Server
//!
//! Accept RESP2 connections and dispatch commands to the request handler.
//!
//! One thread per connection, parked in a blocking read/dispatch/write
//! loop; the accept loop itself polls a nonblocking listener so it can
//! check a shutdown flag between connections.

use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tierkv_common::CoreError;
use tracing::{info, warn};

use crate::handler::{log_if_server_error, RequestHandler};
use crate::protocol::{read_command, write_bulk, write_error, write_integer, write_null, write_simple};

/// Runs the accept loop until `shutdown` is set. Spawns one thread per
/// accepted connection; each thread owns its socket and reads commands
/// until the peer disconnects or sends a malformed frame.
pub fn serve(
    listener: TcpListener,
    handler: Arc<RequestHandler>,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<()> {
    listener.set_nonblocking(true)?;

    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!(%peer, "accepted connection");
                let handler = Arc::clone(&handler);
                thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &handler) {
                        warn!(%peer, error = %err, "connection closed with error");
                    }
                });
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn handle_connection(stream: TcpStream, handler: &RequestHandler) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line_buf = Vec::with_capacity(128);

    loop {
        match read_command(&mut reader, &mut line_buf) {
            Ok(Some(args)) => {
                let response = dispatch(&args, handler);
                writer.write_all(&response)?;
            }
            Ok(None) => return Ok(()),
            Err(_) => {
                let mut buf = Vec::new();
                write_error(&mut buf, "protocol error").ok();
                writer.write_all(&buf)?;
                return Ok(());
            }
        }
    }
}

fn dispatch(args: &[Vec<u8>], handler: &RequestHandler) -> Vec<u8> {
    let mut buf = Vec::new();
    if args.is_empty() {
        write_error(&mut buf, "empty command").ok();
        return buf;
    }

    let start = Instant::now();
    handler.metrics.record_request_start();

    let cmd = &args[0];
    let result = if eq_ignore_ascii_case(cmd, b"CREATE") {
        handle_create(args, handler, &mut buf)
    } else if eq_ignore_ascii_case(cmd, b"READ") {
        handle_read(args, handler, &mut buf)
    } else if eq_ignore_ascii_case(cmd, b"DELETE") {
        handle_delete(args, handler, &mut buf)
    } else if eq_ignore_ascii_case(cmd, b"PING") {
        write_simple(&mut buf, "PONG").ok();
        Ok(())
    } else {
        write_error(&mut buf, "unknown command").ok();
        Ok(())
    };

    if let Err(err) = result {
        log_if_server_error(&handler.metrics, &err);
        write_error(&mut buf, &format!("{err}")).ok();
    }

    handler.metrics.record_request_end(start.elapsed());
    buf
}

fn handle_create(args: &[Vec<u8>], handler: &RequestHandler, buf: &mut Vec<u8>) -> Result<(), CoreError> {
    if args.len() != 3 {
        write_error(buf, "wrong number of arguments for CREATE").ok();
        return Ok(());
    }
    handler.create(&args[1], &args[2])?;
    write_simple(buf, "OK").ok();
    Ok(())
}

fn handle_read(args: &[Vec<u8>], handler: &RequestHandler, buf: &mut Vec<u8>) -> Result<(), CoreError> {
    if args.len() != 2 {
        write_error(buf, "wrong number of arguments for READ").ok();
        return Ok(());
    }
    match handler.read(&args[1])? {
        Some(value) => write_bulk(buf, &value).ok(),
        None => write_null(buf).ok(),
    };
    Ok(())
}

fn handle_delete(args: &[Vec<u8>], handler: &RequestHandler, buf: &mut Vec<u8>) -> Result<(), CoreError> {
    if args.len() != 2 {
        write_error(buf, "wrong number of arguments for DELETE").ok();
        return Ok(());
    }
    handler.delete(&args[1])?;
    write_integer(buf, 1).ok();
    Ok(())
}

fn eq_ignore_ascii_case(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metrics::Metrics;
    use std::io::{BufRead, Read, Write as _};
    use std::net::TcpStream as StdTcpStream;
    use tierkv_store::{ConnectionPool, MockStore, Store};

    fn spawn_test_server() -> (std::net::SocketAddr, Arc<AtomicBool>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let pool = ConnectionPool::new(2, || Ok(Box::new(MockStore::new()) as Box<dyn Store>)).unwrap();
        let config = Config {
            shard_count: 4,
            shard_capacity: 64,
            ..Config::default()
        };
        let handler = Arc::new(RequestHandler::new(&config, pool, Arc::new(Metrics::new())));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let join = thread::spawn(move || {
            serve(listener, handler, shutdown_for_thread).ok();
        });

        (addr, shutdown, join)
    }

    fn send_command(stream: &mut StdTcpStream, args: &[&[u8]]) -> Vec<u8> {
        let mut encoded = Vec::new();
        encoded.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
        for arg in args {
            encoded.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
            encoded.extend_from_slice(arg);
            encoded.extend_from_slice(b"\r\n");
        }
        stream.write_all(&encoded).unwrap();

        let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if let Some(len) = line.strip_prefix('$') {
            let len: i64 = len.trim().parse().unwrap();
            if len < 0 {
                return b"$-1".to_vec();
            }
            let mut data = vec![0u8; len as usize];
            reader.read_exact(&mut data).unwrap();
            let mut crlf = [0u8; 2];
            reader.read_exact(&mut crlf).unwrap();
            data
        } else {
            line.trim_end().as_bytes().to_vec()
        }
    }

    /// Create then read returns the written value.
    #[test]
    fn create_then_read() {
        let (addr, shutdown, _join) = spawn_test_server();
        let mut stream = StdTcpStream::connect(addr).unwrap();

        let response = send_command(&mut stream, &[b"CREATE", b"a", b"1"]);
        assert_eq!(response, b"+OK");

        let response = send_command(&mut stream, &[b"READ", b"a"]);
        assert_eq!(response, b"1");

        shutdown.store(true, Ordering::Relaxed);
    }

    /// Reading an absent key returns a null bulk reply.
    #[test]
    fn read_missing_key() {
        let (addr, shutdown, _join) = spawn_test_server();
        let mut stream = StdTcpStream::connect(addr).unwrap();

        let response = send_command(&mut stream, &[b"READ", b"nope"]);
        assert_eq!(response, b"$-1");

        shutdown.store(true, Ordering::Relaxed);
    }

    #[test]
    fn unknown_command_is_an_error_reply() {
        let (addr, shutdown, _join) = spawn_test_server();
        let mut stream = StdTcpStream::connect(addr).unwrap();

        let response = send_command(&mut stream, &[b"BOGUS"]);
        assert!(response.starts_with(b"-ERR"));

        shutdown.store(true, Ordering::Relaxed);
    }
}
