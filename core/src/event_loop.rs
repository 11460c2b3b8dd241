//! Single-threaded connection multiplexer
//!
//! One `mio::Poll` watches the listening socket and every accepted stream.
//! Each [`EventLoop::tick`] runs the liveness sweep when due, polls with a
//! zero timeout, accepts and reads whatever is ready, applies finished
//! hostname lookups, flushes send queues and finally closes the sockets of
//! sessions the server has deregistered.

use crate::client::ClientId;
use crate::handler::LineHandler;
use crate::lookup::{HostLookup, HostResolver};
use crate::{Config, Error, Result, Server};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::future::Future;
use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

const LISTENER: Token = Token(0);
const FIRST_CONNECTION_TOKEN: usize = 1;
const LISTEN_BACKLOG: i32 = 10;
const EVENTS_CAPACITY: usize = 1024;

/// An accepted stream and the session it belongs to
#[derive(Debug)]
struct Connection {
    id: ClientId,
    stream: TcpStream,
}

/// Listening socket, watch-set and server state driven from one thread
pub struct EventLoop<H: LineHandler> {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: HashMap<Token, Connection>,
    tokens: HashMap<ClientId, Token>,
    next_token: usize,
    server: Server,
    handler: H,
    resolver: HostResolver,
    last_sweep: Instant,
    read_buf: Vec<u8>,
}

impl<H: LineHandler> EventLoop<H> {
    /// Bind the listening socket and build the watch-set around it.
    /// Hostnames come from the system resolver when `lookup.reverse_dns` is set.
    pub fn bind(config: Config, handler: H) -> Result<Self> {
        config.validate()?;
        let resolver = HostResolver::from_config(&config.lookup);
        Self::with_resolver(config, handler, resolver)
    }

    /// Bind with a caller-supplied hostname source
    pub fn bind_with_lookup(config: Config, handler: H, lookup: Arc<dyn HostLookup>) -> Result<Self> {
        config.validate()?;
        let resolver = HostResolver::new(Some(lookup), &config.lookup);
        Self::with_resolver(config, handler, resolver)
    }

    fn with_resolver(config: Config, handler: H, resolver: HostResolver) -> Result<Self> {
        let ip: IpAddr = config
            .bind
            .address
            .parse()
            .map_err(|e| Error::Bind(format!("{}: {}", config.bind.address, e)))?;
        let addr = SocketAddr::new(ip, config.bind.port);

        let listener =
            listen(addr).map_err(|e| Error::Bind(format!("{}: {}", config.bind_address(), e)))?;
        let mut listener = TcpListener::from_std(listener);
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        tracing::info!(%local_addr, reverse_dns = resolver.is_enabled(), "Listening for connections");

        let read_buf = vec![0; config.server.recv_buffer];
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            local_addr,
            connections: HashMap::new(),
            tokens: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            server: Server::new(config),
            handler,
            resolver,
            last_sweep: Instant::now(),
            read_buf,
        })
    }

    /// Address the listener actually bound, useful with port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    /// Number of session streams in the watch-set
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run one iteration of the loop
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        let sweep_interval = self.server.config().liveness.sweep_interval();
        if now.saturating_duration_since(self.last_sweep) >= sweep_interval {
            self.server.inactive_client_check(now);
            self.last_sweep = now;
        }

        match self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }

        let ready: Vec<Token> = self.events.iter().map(|event| event.token()).collect();
        for token in ready {
            if token == LISTENER {
                self.accept(now);
            } else {
                self.read(token);
            }
        }

        self.apply_hostnames(now);
        self.flush();
        self.reap();
        Ok(())
    }

    /// Tick until `shutdown` resolves, sleeping between iterations, then
    /// disconnect everyone.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let tick_interval = self.server.config().liveness.tick_interval();
        tokio::pin!(shutdown);

        loop {
            self.tick(Instant::now())?;

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(tick_interval) => {}
            }
        }

        tracing::info!(clients = self.server.client_count(), "Shutting down");
        self.server.terminate_clients("Server shutting down");
        self.flush();
        self.reap();
        Ok(())
    }

    /// Accept until the backlog is empty; readiness is edge-triggered
    fn accept(&mut self, now: Instant) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self
                        .poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                    {
                        tracing::warn!(peer = %addr, "Failed to watch connection: {}", e);
                        continue;
                    }

                    let id = self.server.connect(addr, now);
                    self.tokens.insert(id, token);
                    self.connections.insert(token, Connection { id, stream });

                    let cached = self.resolver.request(id, now);
                    self.server.set_hostname(id, cached);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!("Accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Drain a readable stream and pass every complete line to the handler
    fn read(&mut self, token: Token) {
        let Some(connection) = self.connections.get_mut(&token) else {
            return;
        };
        let id = connection.id;

        let mut lines = Vec::new();
        let mut closed: Option<String> = None;
        loop {
            match connection.stream.read(&mut self.read_buf) {
                Ok(0) => {
                    closed = Some("Connection closed".to_string());
                    break;
                }
                Ok(n) => {
                    let Some(client) = self.server.client_mut(&id) else {
                        break;
                    };
                    client.recvq.append(&self.read_buf[..n]);
                    lines.extend(client.recvq.extract_lines());
                    if client.recvq.overflowed() {
                        client.recvq.clear();
                        closed = Some("RecvQ exceeded".to_string());
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    closed = Some(format!("Read error: {}", e));
                    break;
                }
            }
        }

        for raw in lines {
            if !self.server.client(&id).is_some_and(|client| client.active) {
                break;
            }
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(_) => {
                    closed = Some("Malformed UTF-8".to_string());
                    break;
                }
            };
            tracing::trace!(peer = %id, "<< {}", line);
            if let Err(e) = self.handler.handle_line(&mut self.server, id, &line) {
                tracing::debug!(peer = %id, "Line handler error: {}", e);
            }
        }

        if let Some(reason) = closed {
            self.server.terminate_client(id, &reason);
        }
    }

    /// Hand finished lookups to their sessions; clients gone since are skipped
    fn apply_hostnames(&mut self, now: Instant) {
        for resolved in self.resolver.completed(now) {
            self.server.set_hostname(resolved.id, resolved.hostname);
        }
    }

    /// Write as much of each send queue as the sockets accept
    fn flush(&mut self) {
        let mut failed = Vec::new();

        for connection in self.connections.values_mut() {
            let Some(client) = self.server.client_mut(&connection.id) else {
                continue;
            };

            while !client.sendq.is_empty() {
                match connection.stream.write(client.sendq.pending()) {
                    Ok(0) => {
                        failed.push((connection.id, "Connection closed".to_string()));
                        break;
                    }
                    Ok(n) => client.sendq.consume(n),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        failed.push((connection.id, format!("Write error: {}", e)));
                        break;
                    }
                }
            }
        }

        for (id, reason) in failed {
            self.server.terminate_client(id, &reason);
        }
    }

    /// Close the streams of deregistered sessions, each exactly once
    fn reap(&mut self) {
        for departed in self.server.take_departed() {
            let Some(token) = self.tokens.remove(&departed.id) else {
                continue;
            };
            let Some(mut connection) = self.connections.remove(&token) else {
                continue;
            };

            write_remaining(&mut connection.stream, departed.id, &departed.pending);
            if let Err(e) = self.poll.registry().deregister(&mut connection.stream) {
                tracing::debug!(peer = %departed.id, "Failed to deregister stream: {}", e);
            }
            let _ = connection.stream.shutdown(Shutdown::Both);
        }
    }
}

/// Best-effort final write; whatever the socket refuses is dropped
fn write_remaining(stream: &mut TcpStream, id: ClientId, mut pending: &[u8]) {
    while !pending.is_empty() {
        match stream.write(pending) {
            Ok(0) => break,
            Ok(n) => pending = &pending[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                tracing::debug!(peer = %id, unsent = pending.len(), "Final write would block");
                break;
            }
            Err(e) => {
                tracing::debug!(peer = %id, unsent = pending.len(), "Final write failed: {}", e);
                break;
            }
        }
    }
}

fn listen(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}
