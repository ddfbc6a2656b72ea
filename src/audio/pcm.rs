/// Number of f32 samples per encoded block (one outbound message per block).
pub const BLOCK_SAMPLES: usize = 4096;

/// Convert float samples in [-1, 1] to signed 16-bit little-endian PCM bytes.
///
/// Each sample is clamped to [-1, 1] and then scaled asymmetrically:
/// negative values by 32768, non-negative values by 32767, truncated to i16.
/// This is the exact linear16 mapping the recognition endpoint expects, so
/// the scaling must not change. Output is 2 bytes per sample, no padding.
pub fn encode_block(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);

    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = if clamped < 0.0 {
            (clamped * 32768.0) as i16
        } else {
            (clamped * 32767.0) as i16
        };
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    bytes
}

/// Re-blocks arbitrary-size capture callbacks into fixed-size sample blocks.
///
/// Audio hosts deliver whatever buffer size they feel like; the wire protocol
/// wants one message per `BLOCK_SAMPLES` samples. Complete blocks are handed
/// off immediately, only the partial tail is retained across pushes.
pub struct BlockAssembler {
    block_samples: usize,
    pending: Vec<f32>,
}

impl BlockAssembler {
    pub fn new(block_samples: usize) -> Self {
        Self {
            block_samples,
            pending: Vec::with_capacity(block_samples),
        }
    }

    /// Append samples and return any complete blocks they produced.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut blocks = Vec::new();
        while self.pending.len() >= self.block_samples {
            let rest = self.pending.split_off(self.block_samples);
            blocks.push(std::mem::replace(&mut self.pending, rest));
        }

        blocks
    }

    /// Take the partial tail, if any. Used at end of capture.
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Number of samples waiting for the next complete block.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for BlockAssembler {
    fn default() -> Self {
        Self::new(BLOCK_SAMPLES)
    }
}
