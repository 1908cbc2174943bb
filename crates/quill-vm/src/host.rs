//! Game-side collaborators
//!
//! The VM reaches the rest of the game only through these traits. Null
//! implementations are provided for tools and tests that run scripts without
//! a game attached.

use crate::thread::ObjectId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Actor and speech subsystem
pub trait ActorSystem {
    /// Check if any actor is currently speaking
    fn is_speaking(&self) -> bool;

    /// Start speech for `actor`
    ///
    /// `sample` is the voice sample for the first line, if the module has one.
    fn speak(&mut self, actor: u16, lines: &[&str], sample: Option<i16>, flags: u8);

    /// Check if `object` has reached its walk destination
    fn has_arrived(&self, object: ObjectId) -> bool;
}

/// Interface panel modes scripts switch between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceMode {
    /// No panel
    Null,
    /// Verb panel
    Main,
    /// Dialog reply panel
    Converse,
}

/// A reply the interface refused to add
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reply rejected: {0}")]
pub struct ReplyError(pub String);

/// Dialog and interface subsystem
pub trait Interface {
    /// Remove every reply from the dialog panel
    fn clear_replies(&mut self);

    /// Offer a reply line
    fn add_reply(
        &mut self,
        text: &str,
        reply_id: u8,
        flags: u8,
        once_bit: Option<u16>,
    ) -> Result<(), ReplyError>;

    /// Show the interface
    fn activate(&mut self);

    /// Switch the panel mode
    fn set_mode(&mut self, mode: InterfaceMode);

    /// Restore the default verb and pointer after a thread finishes
    fn reset_verb(&mut self);
}

/// Random numbers for weighted branches
pub trait RandomSource {
    /// Uniform value in `0..=max`
    fn random_in_range(&mut self, max: u16) -> u16;
}

/// Actors that never speak and are always where they were sent
#[derive(Debug, Default, Clone, Copy)]
pub struct NullActors;

impl ActorSystem for NullActors {
    fn is_speaking(&self) -> bool {
        false
    }

    fn speak(&mut self, _actor: u16, _lines: &[&str], _sample: Option<i16>, _flags: u8) {}

    fn has_arrived(&self, _object: ObjectId) -> bool {
        true
    }
}

/// Interface that accepts everything and shows nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInterface;

impl Interface for NullInterface {
    fn clear_replies(&mut self) {}

    fn add_reply(
        &mut self,
        _text: &str,
        _reply_id: u8,
        _flags: u8,
        _once_bit: Option<u16>,
    ) -> Result<(), ReplyError> {
        Ok(())
    }

    fn activate(&mut self) {}

    fn set_mode(&mut self, _mode: InterfaceMode) {}

    fn reset_verb(&mut self) {}
}

/// `RandomSource` backed by `StdRng`
#[derive(Debug, Clone)]
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    /// Seed from the operating system
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence for replays and tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for StdRandom {
    fn random_in_range(&mut self, max: u16) -> u16 {
        self.rng.gen_range(0..=max)
    }
}

/// The game-side services the interpreter calls into
pub struct Collaborators {
    /// Actor and speech subsystem
    pub actors: Box<dyn ActorSystem>,
    /// Dialog and interface subsystem
    pub interface: Box<dyn Interface>,
    /// Random source for weighted branches
    pub random: Box<dyn RandomSource>,
}

impl Collaborators {
    /// Null actors and interface with an entropy-seeded random source
    pub fn detached() -> Self {
        Self {
            actors: Box::new(NullActors),
            interface: Box::new(NullInterface),
            random: Box::new(StdRandom::from_entropy()),
        }
    }

    /// Replace the actor subsystem
    pub fn with_actors(mut self, actors: impl ActorSystem + 'static) -> Self {
        self.actors = Box::new(actors);
        self
    }

    /// Replace the interface subsystem
    pub fn with_interface(mut self, interface: impl Interface + 'static) -> Self {
        self.interface = Box::new(interface);
        self
    }

    /// Replace the random source
    pub fn with_random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Box::new(random);
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::detached()
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
