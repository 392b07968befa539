//! Latest-result-wins tokens, one counter per output stream.
//!
//! Usage: issue a token before enqueueing work, check it once after the awaited
//! result returns and immediately before committing. Inside one queued task no
//! other evaluation can intervene, so a single check at commit time suffices;
//! only later-issued tokens can invalidate the result.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Latent vector + recurrent memory.
    Latent,
    /// Interpretable state.
    Interpretable,
    /// Image decoded from the latent vector.
    LatentImage,
    /// Image decoded from the interpretable state.
    InterpretableImage,
}

impl Stream {
    pub const COUNT: usize = 4;

    pub fn all() -> &'static [Stream] {
        &[
            Stream::Latent,
            Stream::Interpretable,
            Stream::LatentImage,
            Stream::InterpretableImage,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            Stream::Latent => "latent",
            Stream::Interpretable => "interpretable",
            Stream::LatentImage => "latent_image",
            Stream::InterpretableImage => "interpretable_image",
        }
    }

    /// The image stream decoded from this state stream.
    pub fn image(self) -> Option<Stream> {
        match self {
            Stream::Latent => Some(Stream::LatentImage),
            Stream::Interpretable => Some(Stream::InterpretableImage),
            Stream::LatentImage | Stream::InterpretableImage => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Stream::Latent => 0,
            Stream::Interpretable => 1,
            Stream::LatentImage => 2,
            Stream::InterpretableImage => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    stream: Stream,
    value: u64,
}

impl Token {
    pub fn stream(&self) -> Stream {
        self.stream
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

#[derive(Debug, Default)]
pub struct StalenessGuard {
    counters: [AtomicU64; Stream::COUNT],
}

impl StalenessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the stream and return the new latest token.
    pub fn issue(&self, stream: Stream) -> Token {
        let value = self.counters[stream.index()].fetch_add(1, Ordering::AcqRel) + 1;
        Token { stream, value }
    }

    /// Latest token without advancing. Work that must survive later work of the
    /// same kind (model steps chain on each other) captures this instead of issuing.
    pub fn current(&self, stream: Stream) -> Token {
        Token {
            stream,
            value: self.counters[stream.index()].load(Ordering::Acquire),
        }
    }

    pub fn is_current(&self, token: Token) -> bool {
        self.counters[token.stream.index()].load(Ordering::Acquire) == token.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_latest_token_is_current() {
        let guard = StalenessGuard::new();
        let tokens: Vec<Token> = (0..5).map(|_| guard.issue(Stream::LatentImage)).collect();

        for t in &tokens[..4] {
            assert!(!guard.is_current(*t));
        }
        assert!(guard.is_current(tokens[4]));
        assert!(tokens.windows(2).all(|w| w[1].value() > w[0].value()));
    }

    #[test]
    fn streams_are_independent() {
        let guard = StalenessGuard::new();
        let latent = guard.issue(Stream::Latent);
        let _ = guard.issue(Stream::Interpretable);
        let _ = guard.issue(Stream::Interpretable);
        assert!(guard.is_current(latent));
    }

    #[test]
    fn current_does_not_advance() {
        let guard = StalenessGuard::new();
        let a = guard.current(Stream::Latent);
        let b = guard.current(Stream::Latent);
        assert_eq!(a, b);
        assert!(guard.is_current(a));

        let _ = guard.issue(Stream::Latent);
        assert!(!guard.is_current(a));
    }

    #[test]
    fn every_state_stream_has_an_image_stream() {
        for s in Stream::all() {
            match s {
                Stream::Latent | Stream::Interpretable => assert!(s.image().is_some()),
                _ => assert!(s.image().is_none()),
            }
        }
    }
}
