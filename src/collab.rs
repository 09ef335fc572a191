//! External collaborator interfaces.
//!
//! The relay loop (see [`crate::relay`]) is deliberately ignorant of two
//! things outside this crate's scope: how outbound terminal output gets
//! wrapped on its way out ([`FrameWriter`]), and how inbound bytes arriving
//! over the socket get split back into terminal output versus control
//! frames ([`InputFramer`]). Both are trait seams so a host embedding this
//! crate can supply its own wire format; the binary shell wires up the
//! pass-through implementations below, which treat the link as an unframed
//! byte pipe, matching this crate's own Non-goals around wire framing.

/// Turns outbound bytes (read from standard input) into whatever the
/// socket's wire format expects before they reach [`crate::buffer::InputBuffer`].
///
/// Implementations must be infallible in the sense that framing a byte
/// slice cannot itself fail for I/O reasons — only the eventual write to
/// the socket can. A framer that needs to reject oversized input should
/// do so by returning a smaller, truncated frame rather than erroring.
pub trait FrameWriter {
    /// Wraps `payload` for transmission, appending the result to `out`.
    fn write_frame(&mut self, payload: &[u8], out: &mut Vec<u8>);
}

/// Splits bytes read from standard input into socket-destined bytes,
/// appended to `out` for the relay loop to queue onto the [`crate::buffer::InputBuffer`].
///
/// A single call may see a partial frame (if the wire format defines frame
/// boundaries at all). Implementations do not buffer the unconsumed tail
/// themselves: the relay loop holds onto whatever `input` this call didn't
/// consume and prepends it to `input` on the next call, so an
/// implementation only ever has to reason about one contiguous, growing
/// slice rather than stitching partial frames back together itself.
pub trait InputFramer {
    /// Consumes as much of `input` as forms complete output, appending the
    /// decoded bytes to `out`. Returns the number of bytes of `input`
    /// consumed; the caller is responsible for re-delivering any
    /// unconsumed remainder, prefixed to `input`, on the next call.
    fn forward_inbound_frames(&mut self, input: &[u8], out: &mut Vec<u8>) -> usize;
}

/// The identity framer: every byte that goes in comes back out unchanged.
///
/// This is what the binary shell uses, since wire framing is explicitly out
/// of scope — the socket carries raw terminal bytes in both directions, and
/// any structure above that is a concern for a layer outside this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl FrameWriter for PassThrough {
    fn write_frame(&mut self, payload: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(payload);
    }
}

impl InputFramer for PassThrough {
    fn forward_inbound_frames(&mut self, input: &[u8], out: &mut Vec<u8>) -> usize {
        out.extend_from_slice(input);
        input.len()
    }
}
