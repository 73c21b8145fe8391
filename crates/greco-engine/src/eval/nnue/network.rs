//! Network weights and the output forward pass.
//!
//! Weights arrive from the caller as a raw little-endian i16 stream in the
//! trainer's quantized export order. The engine never loads files itself.

use super::accumulator::Accumulator;
use super::features::INPUTS;

/// Hidden-layer width.
pub const HIDDEN: usize = 256;

/// First-layer quantization factor.
const QA: i32 = 255;

/// Output-layer quantization factor.
const QB: i32 = 64;

/// Dequantization scale to centipawns.
const SCALE: i32 = 400;

/// Total i16 values in a weight blob.
const WEIGHT_COUNT: usize = INPUTS * HIDDEN // feature weights
    + HIDDEN                                // feature bias
    + 2 * HIDDEN                            // output weights, both halves
    + 1; // output bias

/// Error for a weight blob of the wrong shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("network blob is {found} bytes, expected {expected}")]
pub struct NetworkFormatError {
    pub expected: usize,
    pub found: usize,
}

/// A loaded, quantized network.
#[derive(Debug)]
pub struct Network {
    /// `INPUTS` rows of `HIDDEN` first-layer weights.
    feature_weights: Vec<i16>,
    feature_bias: [i16; HIDDEN],
    /// Output row for the side to move's accumulator, then the opponent's.
    output_weights: [i16; 2 * HIDDEN],
    output_bias: i16,
}

impl Network {
    /// Parse a little-endian i16 weight blob in export order:
    /// feature weights, feature bias, output weights, output bias.
    pub fn from_bytes(bytes: &[u8]) -> Result<Network, NetworkFormatError> {
        if bytes.len() != WEIGHT_COUNT * 2 {
            return Err(NetworkFormatError {
                expected: WEIGHT_COUNT * 2,
                found: bytes.len(),
            });
        }
        let mut values = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]));

        let feature_weights: Vec<i16> = values.by_ref().take(INPUTS * HIDDEN).collect();
        let mut feature_bias = [0i16; HIDDEN];
        for cell in feature_bias.iter_mut() {
            *cell = values.next().expect("blob length verified above");
        }
        let mut output_weights = [0i16; 2 * HIDDEN];
        for cell in output_weights.iter_mut() {
            *cell = values.next().expect("blob length verified above");
        }
        let output_bias = values.next().expect("blob length verified above");

        Ok(Network {
            feature_weights,
            feature_bias,
            output_weights,
            output_bias,
        })
    }

    /// First-layer weight row of one input feature.
    #[inline]
    pub(crate) fn feature_weights(&self, feature: usize) -> &[i16] {
        &self.feature_weights[feature * HIDDEN..(feature + 1) * HIDDEN]
    }

    /// First-layer bias vector.
    #[inline]
    pub(crate) fn feature_bias(&self) -> [i16; HIDDEN] {
        self.feature_bias
    }

    /// Forward pass over both perspectives, side to move first.
    /// Returns centipawns for the side to move.
    pub fn evaluate(&self, us: &Accumulator, them: &Accumulator) -> i32 {
        let mut output = 0i32;
        for (&x, &w) in us.vals.iter().zip(&self.output_weights[..HIDDEN]) {
            output += screlu(x) * i32::from(w);
        }
        for (&x, &w) in them.vals.iter().zip(&self.output_weights[HIDDEN..]) {
            output += screlu(x) * i32::from(w);
        }

        // Peel one QA off the squared activation, add the bias, rescale.
        output /= QA;
        output += i32::from(self.output_bias);
        output * SCALE / (QA * QB)
    }
}

/// Squared clipped ReLU.
#[inline]
fn screlu(x: i16) -> i32 {
    let clipped = i32::from(x).clamp(0, QA);
    clipped * clipped
}
