//! Message transports between the debugger driver and the VM.
//!
//! A messenger carries whole strings, in order, one per `send`. The two
//! implementations are an in-process channel pair (tests and the embedded VM
//! the driver spawns for `run`) and a TCP stream for remote attachment.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{channel, Receiver, Sender};

use log::warn;

pub trait Messenger: Send {
    /// Delivers one message to the peer. Delivery to a dead peer is silently
    /// dropped; the failure surfaces on the next `receive`.
    fn send(&mut self, message: &str);

    /// Blocks until the peer sends a message. `None` means the channel is
    /// closed and no further messages will arrive.
    fn receive(&mut self) -> Option<String>;
}

/// One end of an in-process queue pair.
pub struct ChannelMessenger {
    tx: Sender<String>,
    rx: Receiver<String>,
}

impl ChannelMessenger {
    /// Creates both ends of a connected pair.
    pub fn pair() -> (ChannelMessenger, ChannelMessenger) {
        let (atx, brx) = channel();
        let (btx, arx) = channel();
        (
            ChannelMessenger { tx: atx, rx: arx },
            ChannelMessenger { tx: btx, rx: brx },
        )
    }
}

impl Messenger for ChannelMessenger {
    fn send(&mut self, message: &str) {
        let _ = self.tx.send(message.to_owned());
    }

    fn receive(&mut self) -> Option<String> {
        self.rx.recv().ok()
    }
}

/// Messenger over a TCP stream. Messages are delimited with a NUL byte,
/// which cannot occur in the text protocol.
pub struct TcpMessenger {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpMessenger {
    /// Connects to a VM listening on localhost at `port`.
    pub fn connect(port: u16) -> io::Result<TcpMessenger> {
        let stream = TcpStream::connect(("127.0.0.1", port))?;
        TcpMessenger::from_stream(stream)
    }

    /// Accepts a single debugger connection on `listener`.
    pub fn accept(listener: &TcpListener) -> io::Result<TcpMessenger> {
        let (stream, _) = listener.accept()?;
        TcpMessenger::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> io::Result<TcpMessenger> {
        let writer = stream.try_clone()?;
        Ok(TcpMessenger {
            reader: BufReader::new(stream),
            writer,
        })
    }
}

impl Messenger for TcpMessenger {
    fn send(&mut self, message: &str) {
        if let Err(e) = self
            .writer
            .write_all(message.as_bytes())
            .and_then(|()| self.writer.write_all(&[0]))
        {
            warn!("dropping message, peer is gone: {}", e);
        }
    }

    fn receive(&mut self) -> Option<String> {
        let mut buf = Vec::new();
        match self.reader.read_until(0, &mut buf) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                if buf.last() == Some(&0) {
                    buf.pop();
                }
                Some(String::from_utf8_lossy(&buf).into_owned())
            }
        }
    }
}
