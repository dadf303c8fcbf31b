//! Wire protocol shared between the server and any connected client.
//!
//! Messages are UTF-8 text: a one-character kind tag and comma-separated
//! fields, one message per line, `\n` terminated. Field layouts are fixed
//! per kind and validated at decode time, so a malformed frame surfaces as
//! a typed [`ProtocolError`] instead of a panic deep in a handler.

use std::error::Error;
use std::fmt;

/// Default TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 4080;

/// Default in-game day length in seconds, sent in the time handshake.
pub const DAY_LENGTH_SECS: u32 = 600;

/// A player position: world coordinates plus view angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rx: f32,
    pub ry: f32,
}

/// The fixed position assigned to new or respawning players.
pub const SPAWN_POINT: Position = Position {
    x: 0.0,
    y: 0.0,
    z: 0.0,
    rx: 0.0,
    ry: 0.0,
};

/// Protocol messages for client-server communication.
///
/// One variant per wire shape. The `P` tag appears twice because the two
/// directions differ in arity: clients send 5 fields, the server prefixes
/// the player id and sends 6.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `A`: authentication handoff (reserved, not dispatched).
    Authenticate { username: String, token: String },
    /// `B`: block placement (`w > 0`) or removal (`w == 0`).
    Block {
        p: i32,
        q: i32,
        x: i32,
        y: i32,
        z: i32,
        w: i32,
    },
    /// `C`: chunk request (reserved).
    Chunk { p: i32, q: i32 },
    /// `D`: player disconnected notice (reserved).
    Disconnect { id: u32 },
    /// `K`: chunk cache key (reserved).
    Key { p: i32, q: i32, key: i32 },
    /// `L`: light level change (reserved).
    Light {
        p: i32,
        q: i32,
        x: i32,
        y: i32,
        z: i32,
        w: i32,
    },
    /// `N`: nickname announcement.
    Nick { name: String },
    /// `P` with 5 fields: a client reporting its own position.
    Position {
        x: f32,
        y: f32,
        z: f32,
        rx: f32,
        ry: f32,
    },
    /// `P` with 6 fields: the server relaying some player's position.
    PlayerPosition {
        id: u32,
        x: f32,
        y: f32,
        z: f32,
        rx: f32,
        ry: f32,
    },
    /// `R`: chunk redraw hint (reserved).
    Redraw { p: i32, q: i32 },
    /// `S`: sign text (reserved). Trailing text may contain commas.
    Sign {
        p: i32,
        q: i32,
        x: i32,
        y: i32,
        z: i32,
        face: i32,
        text: String,
    },
    /// `T`: chat line or `/`-prefixed command. Text may contain commas.
    Talk { text: String },
    /// `E`: world time: unix seconds and day length.
    Time { now: u64, day_length: u32 },
    /// `V`: protocol version (reserved).
    Version { value: u32 },
    /// `U`: identity assignment sent to a client right after accept.
    You {
        id: u32,
        x: f32,
        y: f32,
        z: f32,
        rx: f32,
        ry: f32,
    },
}

/// A frame that failed schema validation. Local to the offending message;
/// the connection it arrived on stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Empty,
    UnknownKind(String),
    WrongFieldCount {
        kind: char,
        expected: &'static str,
        got: usize,
    },
    BadNumber {
        kind: char,
        field: &'static str,
        value: String,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Empty => write!(f, "empty frame"),
            ProtocolError::UnknownKind(kind) => write!(f, "unknown message kind '{}'", kind),
            ProtocolError::WrongFieldCount {
                kind,
                expected,
                got,
            } => write!(
                f,
                "'{}' message expects {} fields, got {}",
                kind, expected, got
            ),
            ProtocolError::BadNumber { kind, field, value } => write!(
                f,
                "'{}' message field {} is not a number: '{}'",
                kind, field, value
            ),
        }
    }
}

impl Error for ProtocolError {}

impl Message {
    /// The one-character wire tag for this message.
    pub fn kind(&self) -> char {
        match self {
            Message::Authenticate { .. } => 'A',
            Message::Block { .. } => 'B',
            Message::Chunk { .. } => 'C',
            Message::Disconnect { .. } => 'D',
            Message::Key { .. } => 'K',
            Message::Light { .. } => 'L',
            Message::Nick { .. } => 'N',
            Message::Position { .. } | Message::PlayerPosition { .. } => 'P',
            Message::Redraw { .. } => 'R',
            Message::Sign { .. } => 'S',
            Message::Talk { .. } => 'T',
            Message::Time { .. } => 'E',
            Message::Version { .. } => 'V',
            Message::You { .. } => 'U',
        }
    }

    pub fn talk(text: impl Into<String>) -> Message {
        Message::Talk { text: text.into() }
    }

    pub fn you(id: u32, position: Position) -> Message {
        Message::You {
            id,
            x: position.x,
            y: position.y,
            z: position.z,
            rx: position.rx,
            ry: position.ry,
        }
    }

    pub fn player_position(id: u32, position: Position) -> Message {
        Message::PlayerPosition {
            id,
            x: position.x,
            y: position.y,
            z: position.z,
            rx: position.rx,
            ry: position.ry,
        }
    }

    /// Serializes to one wire frame, trailing `\n` included. Free-text
    /// fields are written verbatim; embedded commas are never escaped.
    pub fn encode(&self) -> String {
        match self {
            Message::Authenticate { username, token } => format!("A,{},{}\n", username, token),
            Message::Block { p, q, x, y, z, w } => {
                format!("B,{},{},{},{},{},{}\n", p, q, x, y, z, w)
            }
            Message::Chunk { p, q } => format!("C,{},{}\n", p, q),
            Message::Disconnect { id } => format!("D,{}\n", id),
            Message::Key { p, q, key } => format!("K,{},{},{}\n", p, q, key),
            Message::Light { p, q, x, y, z, w } => {
                format!("L,{},{},{},{},{},{}\n", p, q, x, y, z, w)
            }
            Message::Nick { name } => format!("N,{}\n", name),
            Message::Position { x, y, z, rx, ry } => {
                format!("P,{},{},{},{},{}\n", x, y, z, rx, ry)
            }
            Message::PlayerPosition { id, x, y, z, rx, ry } => {
                format!("P,{},{},{},{},{},{}\n", id, x, y, z, rx, ry)
            }
            Message::Redraw { p, q } => format!("R,{},{}\n", p, q),
            Message::Sign {
                p,
                q,
                x,
                y,
                z,
                face,
                text,
            } => format!("S,{},{},{},{},{},{},{}\n", p, q, x, y, z, face, text),
            Message::Talk { text } => format!("T,{}\n", text),
            Message::Time { now, day_length } => format!("E,{},{}\n", now, day_length),
            Message::Version { value } => format!("V,{}\n", value),
            Message::You { id, x, y, z, rx, ry } => {
                format!("U,{},{},{},{},{},{}\n", id, x, y, z, rx, ry)
            }
        }
    }

    /// Parses one frame. The line terminator may be present or already
    /// stripped. Trailing free-text fields (`Talk`, `Sign`) are rebuilt by
    /// re-joining the remaining parts with `,`.
    pub fn decode(line: &str) -> Result<Message, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let parts: Vec<&str> = line.split(',').collect();
        let fields = &parts[1..];

        match parts[0] {
            "A" => {
                expect('A', "exactly 2", fields, 2)?;
                Ok(Message::Authenticate {
                    username: fields[0].to_string(),
                    token: fields[1].to_string(),
                })
            }
            "B" => {
                expect('B', "exactly 6", fields, 6)?;
                Ok(Message::Block {
                    p: int('B', "p", fields[0])?,
                    q: int('B', "q", fields[1])?,
                    x: int('B', "x", fields[2])?,
                    y: int('B', "y", fields[3])?,
                    z: int('B', "z", fields[4])?,
                    w: int('B', "w", fields[5])?,
                })
            }
            "C" => {
                expect('C', "exactly 2", fields, 2)?;
                Ok(Message::Chunk {
                    p: int('C', "p", fields[0])?,
                    q: int('C', "q", fields[1])?,
                })
            }
            "D" => {
                expect('D', "exactly 1", fields, 1)?;
                Ok(Message::Disconnect {
                    id: id('D', "id", fields[0])?,
                })
            }
            "K" => {
                expect('K', "exactly 3", fields, 3)?;
                Ok(Message::Key {
                    p: int('K', "p", fields[0])?,
                    q: int('K', "q", fields[1])?,
                    key: int('K', "key", fields[2])?,
                })
            }
            "L" => {
                expect('L', "exactly 6", fields, 6)?;
                Ok(Message::Light {
                    p: int('L', "p", fields[0])?,
                    q: int('L', "q", fields[1])?,
                    x: int('L', "x", fields[2])?,
                    y: int('L', "y", fields[3])?,
                    z: int('L', "z", fields[4])?,
                    w: int('L', "w", fields[5])?,
                })
            }
            "N" => {
                // Nickname is the first field; extra fields are tolerated
                // and ignored.
                if fields.is_empty() {
                    return Err(ProtocolError::WrongFieldCount {
                        kind: 'N',
                        expected: "at least 1",
                        got: 0,
                    });
                }
                Ok(Message::Nick {
                    name: fields[0].to_string(),
                })
            }
            "P" => match fields.len() {
                5 => Ok(Message::Position {
                    x: float('P', "x", fields[0])?,
                    y: float('P', "y", fields[1])?,
                    z: float('P', "z", fields[2])?,
                    rx: float('P', "rx", fields[3])?,
                    ry: float('P', "ry", fields[4])?,
                }),
                6 => Ok(Message::PlayerPosition {
                    id: id('P', "id", fields[0])?,
                    x: float('P', "x", fields[1])?,
                    y: float('P', "y", fields[2])?,
                    z: float('P', "z", fields[3])?,
                    rx: float('P', "rx", fields[4])?,
                    ry: float('P', "ry", fields[5])?,
                }),
                got => Err(ProtocolError::WrongFieldCount {
                    kind: 'P',
                    expected: "5 or 6",
                    got,
                }),
            },
            "R" => {
                expect('R', "exactly 2", fields, 2)?;
                Ok(Message::Redraw {
                    p: int('R', "p", fields[0])?,
                    q: int('R', "q", fields[1])?,
                })
            }
            "S" => {
                if fields.len() < 7 {
                    return Err(ProtocolError::WrongFieldCount {
                        kind: 'S',
                        expected: "at least 7",
                        got: fields.len(),
                    });
                }
                Ok(Message::Sign {
                    p: int('S', "p", fields[0])?,
                    q: int('S', "q", fields[1])?,
                    x: int('S', "x", fields[2])?,
                    y: int('S', "y", fields[3])?,
                    z: int('S', "z", fields[4])?,
                    face: int('S', "face", fields[5])?,
                    text: fields[6..].join(","),
                })
            }
            "T" => {
                if fields.is_empty() {
                    return Err(ProtocolError::WrongFieldCount {
                        kind: 'T',
                        expected: "at least 1",
                        got: 0,
                    });
                }
                Ok(Message::Talk {
                    text: fields.join(","),
                })
            }
            "E" => {
                expect('E', "exactly 2", fields, 2)?;
                let now = fields[0]
                    .trim()
                    .parse()
                    .map_err(|_| ProtocolError::BadNumber {
                        kind: 'E',
                        field: "now",
                        value: fields[0].to_string(),
                    })?;
                Ok(Message::Time {
                    now,
                    day_length: id('E', "day_length", fields[1])?,
                })
            }
            "V" => {
                expect('V', "exactly 1", fields, 1)?;
                Ok(Message::Version {
                    value: id('V', "value", fields[0])?,
                })
            }
            "U" => {
                expect('U', "exactly 6", fields, 6)?;
                Ok(Message::You {
                    id: id('U', "id", fields[0])?,
                    x: float('U', "x", fields[1])?,
                    y: float('U', "y", fields[2])?,
                    z: float('U', "z", fields[3])?,
                    rx: float('U', "rx", fields[4])?,
                    ry: float('U', "ry", fields[5])?,
                })
            }
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

fn expect(
    kind: char,
    expected: &'static str,
    fields: &[&str],
    count: usize,
) -> Result<(), ProtocolError> {
    if fields.len() == count {
        Ok(())
    } else {
        Err(ProtocolError::WrongFieldCount {
            kind,
            expected,
            got: fields.len(),
        })
    }
}

fn int(kind: char, field: &'static str, raw: &str) -> Result<i32, ProtocolError> {
    raw.trim().parse().map_err(|_| ProtocolError::BadNumber {
        kind,
        field,
        value: raw.to_string(),
    })
}

fn id(kind: char, field: &'static str, raw: &str) -> Result<u32, ProtocolError> {
    raw.trim().parse().map_err(|_| ProtocolError::BadNumber {
        kind,
        field,
        value: raw.to_string(),
    })
}

fn float(kind: char, field: &'static str, raw: &str) -> Result<f32, ProtocolError> {
    raw.trim().parse().map_err(|_| ProtocolError::BadNumber {
        kind,
        field,
        value: raw.to_string(),
    })
}

/// Accumulates raw socket bytes and yields complete `\n`-terminated frames.
///
/// A partial trailing frame (terminator not yet observed) is retained and
/// prefixed to the next push rather than discarded; reads may split a
/// frame, or even a multi-byte character, at any byte boundary.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every newly completed frame, terminator
    /// stripped. A `\r` before the `\n` is stripped as well.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            frames.push(String::from_utf8_lossy(&line).into_owned());
        }
        frames
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
