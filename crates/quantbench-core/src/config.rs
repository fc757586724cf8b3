use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QuantBenchError, Result};

/// Model sizes the backends in this family ship.
pub const AVAILABLE_SIZES: &[ModelSize] = &[
    ModelSize::B1,
    ModelSize::B8,
    ModelSize::B70,
    ModelSize::B405,
];

/// Quantization modes the backends in this family support.
pub const AVAILABLE_QUANTS: &[Quantization] = &[
    Quantization::Default,
    Quantization::Int8,
    Quantization::Nf4,
    Quantization::Float16,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelSize {
    #[serde(rename = "1B")]
    B1,
    #[serde(rename = "8B")]
    B8,
    #[serde(rename = "70B")]
    B70,
    #[serde(rename = "405B")]
    B405,
}

impl ModelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::B1 => "1B",
            ModelSize::B8 => "8B",
            ModelSize::B70 => "70B",
            ModelSize::B405 => "405B",
        }
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelSize {
    type Err = QuantBenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1B" => Ok(ModelSize::B1),
            "8B" => Ok(ModelSize::B8),
            "70B" => Ok(ModelSize::B70),
            "405B" => Ok(ModelSize::B405),
            other => Err(QuantBenchError::Config(format!(
                "Unknown model size: {} (expected one of 1B, 8B, 70B, 405B)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    Default,
    Int8,
    Nf4,
    Float16,
}

impl Quantization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantization::Default => "default",
            Quantization::Int8 => "int8",
            Quantization::Nf4 => "nf4",
            Quantization::Float16 => "float16",
        }
    }

    /// Value passed to the backend server's `--quantize` flag.
    /// The default mode passes no flag at all.
    pub fn flag_value(&self) -> Option<&'static str> {
        match self {
            Quantization::Default => None,
            other => Some(other.as_str()),
        }
    }

    /// GGUF filename suffix for the pre-quantized llama.cpp models.
    pub fn gguf_suffix(&self) -> &'static str {
        match self {
            Quantization::Default => "Q6_K",
            Quantization::Int8 => "Q8_0",
            Quantization::Nf4 => "Q4_K_M",
            Quantization::Float16 => "f16",
        }
    }
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quantization {
    type Err = QuantBenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(Quantization::Default),
            "int8" => Ok(Quantization::Int8),
            "nf4" => Ok(Quantization::Nf4),
            "float16" => Ok(Quantization::Float16),
            other => Err(QuantBenchError::Config(format!(
                "Unknown quantization: {} (expected one of default, int8, nf4, float16)",
                other
            ))),
        }
    }
}

/// One immutable point of the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub size: ModelSize,
    pub quantize: Quantization,
    pub seed: u64,
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/seed{}", self.size, self.quantize, self.seed)
    }
}

/// Independently declared axis value sets. The sweep runs their
/// Cartesian product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepAxes {
    pub sizes: Vec<ModelSize>,
    pub quantizations: Vec<Quantization>,
    pub seeds: Vec<u64>,
}

impl Default for SweepAxes {
    fn default() -> Self {
        Self {
            sizes: vec![ModelSize::B1],
            quantizations: AVAILABLE_QUANTS.to_vec(),
            seeds: vec![42],
        }
    }
}

impl SweepAxes {
    /// Restrict the quantization axis to a single value. This replaces
    /// the old pattern of temporarily overwriting a shared option list.
    pub fn with_quantization(mut self, quant: Quantization) -> Self {
        self.quantizations = vec![quant];
        self
    }

    /// Check declared values against the globally valid sets. A
    /// violation aborts the sweep before any process is spawned.
    pub fn validate(&self) -> Result<()> {
        self.validate_against(AVAILABLE_SIZES, AVAILABLE_QUANTS)
    }

    /// Same check against a backend's own valid sets (a backend may
    /// support fewer modes than the family-wide list).
    pub fn validate_against(
        &self,
        available_sizes: &[ModelSize],
        available_quants: &[Quantization],
    ) -> Result<()> {
        if self.sizes.is_empty() || self.quantizations.is_empty() || self.seeds.is_empty() {
            return Err(QuantBenchError::Config(
                "Every sweep axis needs at least one value".to_string(),
            ));
        }
        for size in &self.sizes {
            if !available_sizes.contains(size) {
                return Err(QuantBenchError::Config(format!(
                    "Size {} is not in the available set",
                    size
                )));
            }
        }
        for quant in &self.quantizations {
            if !available_quants.contains(quant) {
                return Err(QuantBenchError::Config(format!(
                    "Quantization {} is not in the available set",
                    quant
                )));
            }
        }
        Ok(())
    }

    /// Cartesian product of the axes, seed-major.
    pub fn configurations(&self) -> Vec<RunConfig> {
        let mut configs =
            Vec::with_capacity(self.seeds.len() * self.sizes.len() * self.quantizations.len());
        for &seed in &self.seeds {
            for &size in &self.sizes {
                for &quantize in &self.quantizations {
                    configs.push(RunConfig {
                        size,
                        quantize,
                        seed,
                    });
                }
            }
        }
        configs
    }
}
