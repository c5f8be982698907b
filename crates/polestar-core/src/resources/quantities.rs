use crate::error::{CoreError, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const KIB: i64 = 1024;
const MIB: i64 = 1024 * 1024;
const GIB: i64 = 1024 * 1024 * 1024;

/// Resource quantities for pods and quota scopes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuantities {
    /// CPU in millicores (1000 = 1 core)
    pub cpu_millicores: i64,
    /// Memory in bytes
    pub memory_bytes: i64,
}

impl ResourceQuantities {
    pub fn new(cpu_millicores: i64, memory_bytes: i64) -> Self {
        Self {
            cpu_millicores,
            memory_bytes,
        }
    }

    /// Build from fractional cores and MiB
    pub fn from_cores_mib(cores: f64, mib: f64) -> Self {
        Self {
            cpu_millicores: (cores * 1000.0).round() as i64,
            memory_bytes: (mib * MIB as f64).round() as i64,
        }
    }

    pub fn cpu_cores(&self) -> f64 {
        self.cpu_millicores as f64 / 1000.0
    }

    pub fn memory_mib(&self) -> f64 {
        self.memory_bytes as f64 / MIB as f64
    }

    /// Parse a CPU quantity into millicores (e.g., "2", "1000m", "0.5", "5e-1")
    pub fn parse_cpu(s: &str) -> Result<i64> {
        parse_quantity("cpu", s, 1000)
    }

    /// Parse a memory quantity into bytes (e.g., "128Mi", "1.5Gi", "1G", "1024")
    pub fn parse_memory(s: &str) -> Result<i64> {
        parse_quantity("memory", s, 1)
    }

    /// Sum CPU and memory from a k8s resource map.
    ///
    /// Unparseable entries are an error rather than zero, so a malformed
    /// pod cannot hide usage from a quota check.
    pub fn from_k8s_resource_map(resources: &BTreeMap<String, Quantity>) -> Result<Self> {
        let cpu_millicores = match resources.get("cpu") {
            Some(q) => Self::parse_cpu(&q.0)?,
            None => 0,
        };

        let memory_bytes = match resources.get("memory") {
            Some(q) => Self::parse_memory(&q.0)?,
            None => 0,
        };

        Ok(Self {
            cpu_millicores,
            memory_bytes,
        })
    }

    /// CPU as a k8s quantity: 250 -> "250m"
    pub fn cpu_quantity(millicores: i64) -> Quantity {
        Quantity(format!("{}m", millicores))
    }

    /// Memory as a k8s quantity in whole MiB, truncating: 128Mi
    pub fn memory_quantity(bytes: i64) -> Quantity {
        Quantity(format!("{}Mi", bytes / MIB))
    }

    /// Human-readable cores: 1500 -> "1.50"
    pub fn format_cores(millicores: i64) -> String {
        format!("{:.2}", millicores as f64 / 1000.0)
    }

    /// Human-readable memory: picks the largest clean unit
    pub fn format_memory(bytes: i64) -> String {
        if bytes != 0 && bytes % GIB == 0 {
            format!("{}Gi", bytes / GIB)
        } else if bytes != 0 && bytes % MIB == 0 {
            format!("{}Mi", bytes / MIB)
        } else if bytes != 0 && bytes % KIB == 0 {
            format!("{}Ki", bytes / KIB)
        } else {
            format!("{}", bytes)
        }
    }

    /// Component-wise max(self, 0)
    pub fn clamp_non_negative(self) -> Self {
        Self {
            cpu_millicores: self.cpu_millicores.max(0),
            memory_bytes: self.memory_bytes.max(0),
        }
    }

    /// Component-wise sum; overflow is an error
    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        let overflow = || {
            CoreError::invalid_quantity("total", format!("{:?} + {:?}", self, rhs), "overflows i64")
        };
        Ok(Self {
            cpu_millicores: self
                .cpu_millicores
                .checked_add(rhs.cpu_millicores)
                .ok_or_else(overflow)?,
            memory_bytes: self
                .memory_bytes
                .checked_add(rhs.memory_bytes)
                .ok_or_else(overflow)?,
        })
    }

    /// Both components times `factor`; overflow is an error
    pub fn checked_scale(self, factor: i64) -> Result<Self> {
        let overflow = || {
            CoreError::invalid_quantity("total", format!("{:?} x {}", self, factor), "overflows i64")
        };
        Ok(Self {
            cpu_millicores: self
                .cpu_millicores
                .checked_mul(factor)
                .ok_or_else(overflow)?,
            memory_bytes: self
                .memory_bytes
                .checked_mul(factor)
                .ok_or_else(overflow)?,
        })
    }
}

/// Parse a Kubernetes quantity into `per_unit` parts of one unit, rounding up.
///
/// Accepts decimal numbers with an optional suffix: binary (`Ki` .. `Ei`),
/// decimal SI (`n`, `u`, `m`, `k`, `M` .. `E`) or an exponent (`12e3`).
fn parse_quantity(resource: &'static str, raw: &str, per_unit: i128) -> Result<i64> {
    let s = raw.trim();
    let invalid = |reason: &str| CoreError::invalid_quantity(resource, raw, reason);

    if s.starts_with('-') {
        return Err(invalid("negative quantity"));
    }
    let s = s.strip_prefix('+').unwrap_or(s);

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
        return Err(invalid("unrecognized format"));
    }

    let mantissa: i128 = format!("{}{}", whole, frac)
        .parse()
        .map_err(|_| invalid("too many digits"))?;

    let (binary_shift, exp10): (u32, i32) = match suffix {
        "" => (0, 0),
        "Ki" => (10, 0),
        "Mi" => (20, 0),
        "Gi" => (30, 0),
        "Ti" => (40, 0),
        "Pi" => (50, 0),
        "Ei" => (60, 0),
        "n" => (0, -9),
        "u" => (0, -6),
        "m" => (0, -3),
        "k" => (0, 3),
        "M" => (0, 6),
        "G" => (0, 9),
        "T" => (0, 12),
        "P" => (0, 15),
        "E" => (0, 18),
        other => match other.strip_prefix(|c: char| c == 'e' || c == 'E') {
            Some(exp) => (
                0,
                exp.parse::<i32>().map_err(|_| invalid("unrecognized suffix"))?,
            ),
            None => return Err(invalid("unrecognized suffix")),
        },
    };

    let frac_digits = i32::try_from(frac.len()).map_err(|_| invalid("too many digits"))?;
    let exp10 = exp10
        .checked_sub(frac_digits)
        .ok_or_else(|| invalid("exponent out of range"))?;

    scale_quantity(mantissa, per_unit, binary_shift, exp10).ok_or_else(|| invalid("out of range"))
}

/// `mantissa * per_unit * 2^binary_shift * 10^exp10`, rounded up, if it fits an i64
fn scale_quantity(mantissa: i128, per_unit: i128, binary_shift: u32, exp10: i32) -> Option<i64> {
    let value = mantissa
        .checked_mul(per_unit)?
        .checked_mul(1i128.checked_shl(binary_shift)?)?;
    let pow = 10i128.checked_pow(exp10.unsigned_abs())?;

    let value = if exp10 >= 0 {
        value.checked_mul(pow)?
    } else {
        value.checked_add(pow - 1)? / pow
    };

    i64::try_from(value).ok()
}
