// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! TCP sockets for coroutines.
//!
//! Sockets are non-blocking. An operation that would block suspends the calling coroutine on the [IoBridge] until the
//! socket is ready, then retries; the worker thread keeps running other coroutines in the meantime.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    io::bridge::IoBridge,
    runtime::fail::Fail,
};
use ::libc::{
    EAFNOSUPPORT,
    EINPROGRESS,
    EIO,
};
use ::socket2::{
    Domain,
    Protocol,
    Socket,
    Type,
};
use ::std::{
    io::{
        self,
        Read,
        Write,
    },
    net::{
        Shutdown,
        SocketAddr,
    },
    os::fd::{
        AsRawFd,
        RawFd,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Backlog of pending connections on a listening socket.
const LISTEN_BACKLOG: i32 = 128;

//======================================================================================================================
// Structures
//======================================================================================================================

/// A listening TCP socket.
pub struct TcpListener {
    socket: Socket,
    bridge: IoBridge,
}

/// A connected TCP socket.
pub struct TcpStream {
    socket: Socket,
    bridge: IoBridge,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl TcpListener {
    /// Creates a socket listening on `addr`.
    pub fn bind(addr: SocketAddr) -> Result<Self, Fail> {
        let socket: Socket = new_socket(addr)?;
        if let Err(e) = socket.set_reuse_address(true) {
            warn!("bind(): cannot set REUSE_ADDRESS option ({:?})", e);
        }
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        debug!("bind(): listening on {:?}", addr);

        Ok(Self {
            socket,
            bridge: IoBridge::global()?.clone(),
        })
    }

    /// Waits for an incoming connection.
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr), Fail> {
        loop {
            match self.socket.accept() {
                Ok((socket, addr)) => {
                    socket.set_nonblocking(true)?;
                    let addr: SocketAddr = match addr.as_socket() {
                        Some(addr) => addr,
                        None => return Err(Fail::new(EAFNOSUPPORT, "peer is not an IP socket")),
                    };
                    trace!("accept(): connection from {:?}", addr);
                    let stream: TcpStream = TcpStream {
                        socket,
                        bridge: self.bridge.clone(),
                    };
                    return Ok((stream, addr));
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.bridge.wait_readable(self.as_raw_fd())?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept(): {:?}", e);
                    return Err(e.into());
                },
            }
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Fail> {
        socket_addr(self.socket.local_addr()?)
    }

    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl TcpStream {
    /// Opens a connection to `addr`.
    pub fn connect(addr: SocketAddr) -> Result<Self, Fail> {
        let socket: Socket = new_socket(addr)?;
        let stream: TcpStream = TcpStream {
            socket,
            bridge: IoBridge::global()?.clone(),
        };

        match stream.socket.connect(&addr.into()) {
            Ok(()) => (),
            Err(e) if e.raw_os_error() == Some(EINPROGRESS) => {
                stream.bridge.wait_writable(stream.as_raw_fd())?;
                if let Some(e) = stream.socket.take_error()? {
                    debug!("connect(): {:?} refused ({:?})", addr, e);
                    return Err(e.into());
                }
            },
            Err(e) => return Err(e.into()),
        }

        trace!("connect(): connected to {:?}", addr);
        Ok(stream)
    }

    /// Reads into `buf`, waiting for data if none is available. Returns zero at end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Fail> {
        loop {
            match (&self.socket).read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.bridge.wait_readable(self.as_raw_fd())?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Writes some of `buf`, waiting for room if the send buffer is full.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Fail> {
        loop {
            match (&self.socket).write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.bridge.wait_writable(self.as_raw_fd())?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Writes all of `buf`.
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Fail> {
        while !buf.is_empty() {
            match TcpStream::write(self, buf)? {
                0 => return Err(Fail::new(EIO, "failed to write whole buffer")),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    pub fn shutdown(&self, how: Shutdown) -> Result<(), Fail> {
        Ok(self.socket.shutdown(how)?)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, Fail> {
        socket_addr(self.socket.peer_addr()?)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Fail> {
        socket_addr(self.socket.local_addr()?)
    }

    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Read for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(TcpStream::read(self, buf)?)
    }
}

impl Write for TcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(TcpStream::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        self.bridge.deregister(self.as_raw_fd());
    }
}

impl Drop for TcpStream {
    fn drop(&mut self) {
        self.bridge.deregister(self.as_raw_fd());
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn new_socket(addr: SocketAddr) -> Result<Socket, Fail> {
    let socket: Socket = match Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)) {
        Ok(socket) => socket,
        Err(e) => {
            error!("new_socket(): failed to create socket ({:?})", e);
            return Err(e.into());
        },
    };
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn socket_addr(addr: socket2::SockAddr) -> Result<SocketAddr, Fail> {
    match addr.as_socket() {
        Some(addr) => Ok(addr),
        None => Err(Fail::new(EAFNOSUPPORT, "not an IP socket address")),
    }
}
