//! Command socket line protocol
//!
//! One UTF-8 command per line; every command except `quit`/`exit` gets
//! exactly one reply line, `OK` or `ERROR: <message>`.

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Close this connection (`quit` / `exit`, any case)
    Quit,
    /// Empty the track overlay
    TrackClear,
    /// Set the track overlay text
    Track(String),
    /// Play an effect, optionally in a named scene
    Play { effect: String, scene: Option<String> },
}

impl Command {
    /// Parse one line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            return Some(Self::Quit);
        }

        if line == "TRACK_CLEAR" {
            return Some(Self::TrackClear);
        }

        if line == "TRACK" {
            return Some(Self::Track(String::new()));
        }
        if let Some(text) = line.strip_prefix("TRACK ") {
            return Some(Self::Track(text.trim().to_string()));
        }

        let (effect, scene) = match line.split_once('@') {
            Some((effect, scene)) => {
                let scene = scene.trim();
                (effect.trim(), (!scene.is_empty()).then(|| scene.to_string()))
            }
            None => (line, None),
        };

        Some(Self::Play {
            effect: effect.to_string(),
            scene,
        })
    }
}

/// Reply line sent back to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Error(String),
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}
