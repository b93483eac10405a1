//! Layer configuration parsing
//!
//! The configuration JSON mirrors the exported network description: one
//! object per layer with input/weight/output parameter blocks. Parsing fails
//! fast on anything the simulator cannot execute.

use std::path::Path;

use serde::Deserialize;

use crate::error::{ModelError, Result};

/// Kind of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// 2D convolution
    Conv,
    /// Fully connected
    Fc,
}

/// Weight quantization descriptor.
///
/// The datapath contract is int8 after quantization decode; only
/// `bits == 8` is accepted.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WeightQuant {
    /// Weight bit width
    #[serde(default = "default_bits")]
    pub bits: u8,
    /// Whether weights are signed
    #[serde(default = "default_signed")]
    pub signed: bool,
    /// Fractional bits (-1: unspecified)
    #[serde(default = "default_frac_bits")]
    pub frac_bits: i8,
    /// Dequantization scale
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_bits() -> u8 {
    8
}
fn default_signed() -> bool {
    true
}
fn default_frac_bits() -> i8 {
    -1
}
fn default_scale() -> f32 {
    1.0
}

impl Default for WeightQuant {
    fn default() -> Self {
        Self {
            bits: 8,
            signed: true,
            frac_bits: -1,
            scale: 1.0,
        }
    }
}

/// Validated parameters of one layer
#[derive(Debug, Clone)]
pub struct LayerSpec {
    /// Layer id
    pub layer_id: u32,
    /// Human-readable name
    pub name: String,
    /// Layer kind
    pub kind: LayerKind,
    /// Input channels
    pub c_in: usize,
    /// Input height
    pub h_in: usize,
    /// Input width
    pub w_in: usize,
    /// Output channels
    pub c_out: usize,
    /// Kernel height
    pub k_h: usize,
    /// Kernel width
    pub k_w: usize,
    /// Vertical stride
    pub s_h: usize,
    /// Horizontal stride
    pub s_w: usize,
    /// Vertical padding
    pub p_h: usize,
    /// Horizontal padding
    pub p_w: usize,
    /// Declared output shape `(C, H, W)`, if present
    pub declared_out: Option<(usize, usize, usize)>,
    /// PE firing threshold
    pub threshold: i8,
    /// Weight quantization
    pub weight_quant: WeightQuant,
}

#[derive(Deserialize)]
struct HwJson {
    h: i64,
    w: i64,
}

#[derive(Deserialize)]
struct ParamsInJson {
    #[serde(rename = "C")]
    c: i64,
    #[serde(rename = "H")]
    h: i64,
    #[serde(rename = "W")]
    w: i64,
}

#[derive(Deserialize)]
struct ParamsWeightJson {
    #[serde(rename = "Cin")]
    c_in: i64,
    #[serde(rename = "Cout")]
    c_out: i64,
    #[serde(rename = "Kh")]
    k_h: i64,
    #[serde(rename = "Kw")]
    k_w: i64,
    stride: HwJson,
    padding: HwJson,
    dilation: HwJson,
}

#[derive(Deserialize)]
struct ParamsOutJson {
    #[serde(rename = "C")]
    c: i64,
    #[serde(rename = "H")]
    h: i64,
    #[serde(rename = "W")]
    w: i64,
}

#[derive(Deserialize)]
struct LayerJson {
    #[serde(rename = "L")]
    layer: i64,
    name: Option<String>,
    kind: String,
    params_in: ParamsInJson,
    params_weight: ParamsWeightJson,
    params_out: Option<ParamsOutJson>,
    threshold: Option<i64>,
    weight_quant: Option<WeightQuant>,
}

#[derive(Deserialize)]
struct NetworkJson {
    layers: Vec<LayerJson>,
}

fn positive(layer: i64, name: &str, value: i64) -> Result<usize> {
    if value <= 0 {
        return Err(ModelError::config(
            layer,
            format!("{name} must be positive, got {value}"),
        ));
    }
    Ok(value as usize)
}

fn non_negative(layer: i64, name: &str, value: i64) -> Result<usize> {
    if value < 0 {
        return Err(ModelError::config(
            layer,
            format!("{name} must not be negative, got {value}"),
        ));
    }
    Ok(value as usize)
}

fn convert_layer(jl: LayerJson) -> Result<LayerSpec> {
    let l = jl.layer;
    if l < 0 {
        return Err(ModelError::config(l, "layer id must not be negative"));
    }

    let kind = match jl.kind.as_str() {
        "conv" => LayerKind::Conv,
        "fc" => LayerKind::Fc,
        other => return Err(ModelError::config(l, format!("unknown layer kind '{other}'"))),
    };

    let pw = &jl.params_weight;
    if pw.dilation.h != 1 || pw.dilation.w != 1 {
        return Err(ModelError::config(l, "dilation != 1 is not supported"));
    }
    if jl.params_in.c != pw.c_in {
        return Err(ModelError::config(
            l,
            format!(
                "params_in.C ({}) does not match params_weight.Cin ({})",
                jl.params_in.c, pw.c_in
            ),
        ));
    }

    let threshold = jl.threshold.unwrap_or(1);
    let threshold = i8::try_from(threshold)
        .map_err(|_| ModelError::config(l, format!("threshold {threshold} outside i8 range")))?;

    let weight_quant = jl.weight_quant.unwrap_or_default();
    if weight_quant.bits != 8 {
        return Err(ModelError::config(
            l,
            format!("only 8-bit weights are supported, got {} bits", weight_quant.bits),
        ));
    }

    let declared_out = match jl.params_out {
        Some(po) => Some((
            positive(l, "params_out.C", po.c)?,
            positive(l, "params_out.H", po.h)?,
            positive(l, "params_out.W", po.w)?,
        )),
        None => None,
    };

    Ok(LayerSpec {
        layer_id: l as u32,
        name: jl.name.unwrap_or_else(|| format!("L{l}")),
        kind,
        c_in: positive(l, "params_in.C", jl.params_in.c)?,
        h_in: positive(l, "params_in.H", jl.params_in.h)?,
        w_in: positive(l, "params_in.W", jl.params_in.w)?,
        c_out: positive(l, "params_weight.Cout", pw.c_out)?,
        k_h: positive(l, "params_weight.Kh", pw.k_h)?,
        k_w: positive(l, "params_weight.Kw", pw.k_w)?,
        s_h: positive(l, "stride.h", pw.stride.h)?,
        s_w: positive(l, "stride.w", pw.stride.w)?,
        p_h: non_negative(l, "padding.h", pw.padding.h)?,
        p_w: non_negative(l, "padding.w", pw.padding.w)?,
        declared_out,
        threshold,
        weight_quant,
    })
}

/// Parse a configuration JSON string into layer specs, ordered by layer id
pub fn parse_config_str(json_text: &str) -> Result<Vec<LayerSpec>> {
    let parsed: NetworkJson = serde_json::from_str(json_text)?;
    let mut specs: Vec<LayerSpec> = parsed
        .layers
        .into_iter()
        .map(convert_layer)
        .collect::<Result<_>>()?;
    specs.sort_by_key(|s| s.layer_id);
    Ok(specs)
}

/// Read and parse a configuration JSON file
pub fn parse_config(path: impl AsRef<Path>) -> Result<Vec<LayerSpec>> {
    let text = std::fs::read_to_string(path)?;
    parse_config_str(&text)
}
