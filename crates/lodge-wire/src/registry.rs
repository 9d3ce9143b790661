//! The registration table mapping wire tags to typed decoders.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::WireError;

/// A message type with a fixed wire tag.
pub trait Tagged {
    /// The tag that identifies this type on the wire. Must be non-empty
    /// and contain no spaces.
    const TAG: &'static str;
}

type Decoder<M> = Box<dyn Fn(&str) -> Result<M, WireError> + Send + Sync>;

/// Maps wire tags to decoders producing a common message type `M`
/// (typically an enum with one variant per registered type).
///
/// Decoders are resolved at registration time — there is no runtime
/// type introspection. Registering the same tag twice is an error.
pub struct MessageRegistry<M> {
    decoders: HashMap<&'static str, Decoder<M>>,
}

impl<M> MessageRegistry<M> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers `T`'s decoder under its tag.
    pub fn register<T>(&mut self) -> Result<(), WireError>
    where
        T: Tagged + DeserializeOwned + Into<M> + 'static,
    {
        match self.decoders.entry(T::TAG) {
            Entry::Occupied(_) => Err(WireError::DuplicateTag(T::TAG)),
            Entry::Vacant(entry) => {
                entry.insert(Box::new(|payload| {
                    serde_json::from_str::<T>(payload)
                        .map(T::into)
                        .map_err(WireError::Malformed)
                }));
                Ok(())
            }
        }
    }

    /// Decodes a `"<tag> <payload>"` line.
    ///
    /// A line with no payload decodes the registered type from JSON
    /// `null`, which accepts unit-like messages.
    pub fn decode(&self, line: &str) -> Result<M, WireError> {
        let (tag, payload) = match line.split_once(' ') {
            Some((tag, payload)) => (tag, payload),
            None => (line, ""),
        };
        if tag.is_empty() {
            return Err(WireError::MissingTag);
        }
        let decoder = self
            .decoders
            .get(tag)
            .ok_or_else(|| WireError::UnknownTag(tag.to_string()))?;
        let payload = if payload.is_empty() { "null" } else { payload };
        decoder(payload)
    }

    /// Returns `true` if a decoder is registered for `tag`.
    pub fn knows(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }
}

impl<M> Default for MessageRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a message as a `"<tag> <payload>"` line.
pub fn encode<T: Tagged + Serialize>(msg: &T) -> Result<String, WireError> {
    let payload = serde_json::to_string(msg).map_err(WireError::Encode)?;
    Ok(format!("{} {}", T::TAG, payload))
}
