//! The network primitive the lifecycle drives.
//!
//! # Design
//! The lifecycle never opens sockets. A `Transport` turns a
//! `PreparedRequest` into a `TransportHandle`, which the lifecycle polls
//! until `is_done` and then reads. Handles are opaque: a host may back them
//! with its own engine primitive, `UreqTransport` backs them with a worker
//! thread, and tests back them with a script.

use std::collections::HashMap;
use std::sync::Arc;

use crate::http::PreparedRequest;
use crate::result::{find_header, AudioClip, Payload, ResultKind, Texture};

/// Starts network fetches.
pub trait Transport: Send + Sync + 'static {
    type Handle: TransportHandle;

    /// Begin sending `request`. Must not block on the network.
    fn send(&self, request: &PreparedRequest) -> Self::Handle;
}

impl<T: Transport> Transport for Arc<T> {
    type Handle = T::Handle;

    fn send(&self, request: &PreparedRequest) -> Self::Handle {
        (**self).send(request)
    }
}

/// One in-flight fetch.
///
/// Accessors other than `is_done` and `progress` are only read once
/// `is_done` returns true.
pub trait TransportHandle: Send + 'static {
    fn is_done(&self) -> bool;

    /// Transport-level error. `None` or an empty string means success.
    fn error(&self) -> Option<String>;

    /// Fractional progress in `[0, 1]`.
    fn progress(&self) -> f32;

    fn text(&self) -> String;

    fn bytes(&self) -> Vec<u8>;

    fn response_headers(&self) -> HashMap<String, String>;

    fn texture(&self, readable: bool) -> Option<Texture> {
        Some(Texture {
            readable,
            content_type: content_type(&self.response_headers()),
            data: self.bytes(),
        })
    }

    fn audio_clip(&self) -> Option<AudioClip> {
        Some(AudioClip {
            content_type: content_type(&self.response_headers()),
            data: self.bytes(),
        })
    }

    /// Abort the fetch and release whatever the handle holds. Called at
    /// most once, on cancel or timeout.
    fn dispose(&mut self);
}

fn content_type(headers: &HashMap<String, String>) -> Option<String> {
    find_header(headers, "Content-Type").map(str::to_string)
}

/// Decode the finished handle's body according to `kind`.
pub(crate) fn decode_payload<H: TransportHandle + ?Sized>(handle: &H, kind: ResultKind) -> Option<Payload> {
    match kind {
        ResultKind::Text => Some(Payload::Text(handle.text())),
        ResultKind::Bytes => Some(Payload::Bytes(handle.bytes())),
        ResultKind::Texture => handle.texture(true).map(Payload::Texture),
        ResultKind::TextureNonReadable => handle.texture(false).map(Payload::Texture),
        ResultKind::Audio => handle.audio_clip().map(Payload::Audio),
    }
}
