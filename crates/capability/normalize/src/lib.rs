//! # 缩放编解码
//!
//! 将协议层读到的原始值转换为工程值，以及反向编码（仅可写点位）。
//!
//! ## 公式
//!
//! ```text
//! engineering_value = raw_value * scaling_multiplier + scaling_offset
//! ```
//!
//! 开关量（coil / discrete_input）不参与缩放。
//!
//! ## 字序
//!
//! 32 位类型（uint32 / int32 / float32）固定为低字在前：
//! `registers[0]` 为低 16 位，`registers[1]` 为高 16 位。

use domain::{DataType, EngineeringValue, Tag};

/// 协议层读到的原始值。
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// 线圈、离散输入、IEC 104 单点/双点
    Bool(bool),
    /// 1–2 个 16 位寄存器
    Registers(Vec<u16>),
    /// IEC 104 已是数值的测量值（归一化、标度化、短浮点）
    Analog(f64),
}

impl RawValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Registers(_) => "registers",
            Self::Analog(_) => "analog",
        }
    }
}

/// 编解码错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// 寄存器数量与数据类型宽度不一致（配置或程序错误）
    #[error("tag {tag}: {data_type} needs {expected} registers, got {actual}")]
    SizeMismatch {
        tag: String,
        data_type: DataType,
        expected: u16,
        actual: usize,
    },

    #[error("tag {tag}: cannot convert {raw} value to {data_type}")]
    TypeMismatch {
        tag: String,
        data_type: DataType,
        raw: &'static str,
    },

    #[error("tag {0} is read-only")]
    ReadOnly(String),

    #[error("tag {0}: scaling multiplier is zero, value cannot be encoded")]
    ZeroMultiplier(String),

    #[error("tag {tag}: raw value {value} out of range for {data_type}")]
    OutOfRange {
        tag: String,
        data_type: DataType,
        value: f64,
    },

    #[error("tag {0}: value is not finite")]
    NotFinite(String),
}

/// 应用缩放公式。
pub fn apply_scaling(raw: f64, tag: &Tag) -> f64 {
    (raw * tag.scaling_multiplier) + tag.scaling_offset
}

/// 解码原始值为工程值。
pub fn decode(raw: &RawValue, tag: &Tag) -> Result<EngineeringValue, CodecError> {
    check_width(tag, tag.size as usize)?;

    if tag.data_type.is_bool() {
        return match raw {
            RawValue::Bool(value) => Ok(EngineeringValue::Bool(*value)),
            RawValue::Analog(value) => Ok(EngineeringValue::Bool(*value != 0.0)),
            RawValue::Registers(_) => Err(type_mismatch(tag, raw)),
        };
    }

    let number = match raw {
        RawValue::Registers(registers) => registers_to_number(registers, tag)?,
        RawValue::Analog(value) => *value,
        RawValue::Bool(value) => {
            if *value {
                1.0
            } else {
                0.0
            }
        }
    };
    Ok(EngineeringValue::Number(apply_scaling(number, tag)))
}

/// 将寄存器组装为未缩放的数值。
pub fn registers_to_number(registers: &[u16], tag: &Tag) -> Result<f64, CodecError> {
    check_width(tag, registers.len())?;
    let value = match tag.data_type {
        DataType::HoldingRegister | DataType::InputRegister | DataType::Uint16 => {
            registers[0] as f64
        }
        DataType::Int16 => registers[0] as i16 as f64,
        DataType::Uint32 => join_words(registers) as f64,
        DataType::Int32 => join_words(registers) as i32 as f64,
        DataType::Float32 => f32::from_bits(join_words(registers)) as f64,
        DataType::Coil | DataType::DiscreteInput => {
            return Err(type_mismatch(tag, &RawValue::Registers(registers.to_vec())));
        }
    };
    Ok(value)
}

/// 将工程值编码为原始值（仅可写点位）。
pub fn encode(value: EngineeringValue, tag: &Tag) -> Result<RawValue, CodecError> {
    if tag.read_only {
        return Err(CodecError::ReadOnly(tag.name.clone()));
    }
    check_width(tag, tag.size as usize)?;

    let registers = match tag.data_type {
        DataType::Coil | DataType::DiscreteInput => {
            return match value {
                EngineeringValue::Bool(flag) => Ok(RawValue::Bool(flag)),
                EngineeringValue::Number(_) => Err(CodecError::TypeMismatch {
                    tag: tag.name.clone(),
                    data_type: tag.data_type,
                    raw: "number",
                }),
            };
        }
        DataType::HoldingRegister | DataType::InputRegister | DataType::Uint16 => {
            let word = to_integer(unscale(value, tag)?, 0.0, u16::MAX as f64, tag)?;
            vec![word as u16]
        }
        DataType::Int16 => {
            let word = to_integer(unscale(value, tag)?, i16::MIN as f64, i16::MAX as f64, tag)?;
            vec![word as i16 as u16]
        }
        DataType::Uint32 => {
            let dword = to_integer(unscale(value, tag)?, 0.0, u32::MAX as f64, tag)?;
            split_words(dword as u32)
        }
        DataType::Int32 => {
            let dword = to_integer(unscale(value, tag)?, i32::MIN as f64, i32::MAX as f64, tag)?;
            split_words(dword as i32 as u32)
        }
        DataType::Float32 => {
            let raw = unscale(value, tag)?;
            let narrowed = raw as f32;
            if !narrowed.is_finite() {
                return Err(CodecError::OutOfRange {
                    tag: tag.name.clone(),
                    data_type: tag.data_type,
                    value: raw,
                });
            }
            split_words(narrowed.to_bits())
        }
    };
    Ok(RawValue::Registers(registers))
}

/// 工程值反算为缩放前的原始数值。
fn unscale(value: EngineeringValue, tag: &Tag) -> Result<f64, CodecError> {
    let engineering = value.as_f64();
    if !engineering.is_finite() {
        return Err(CodecError::NotFinite(tag.name.clone()));
    }
    if tag.scaling_multiplier == 0.0 {
        return Err(CodecError::ZeroMultiplier(tag.name.clone()));
    }
    Ok((engineering - tag.scaling_offset) / tag.scaling_multiplier)
}

fn check_width(tag: &Tag, actual: usize) -> Result<(), CodecError> {
    let expected = tag.data_type.register_width();
    if actual != expected as usize || tag.size != expected {
        return Err(CodecError::SizeMismatch {
            tag: tag.name.clone(),
            data_type: tag.data_type,
            expected,
            actual,
        });
    }
    Ok(())
}

fn type_mismatch(tag: &Tag, raw: &RawValue) -> CodecError {
    CodecError::TypeMismatch {
        tag: tag.name.clone(),
        data_type: tag.data_type,
        raw: raw.kind(),
    }
}

fn join_words(registers: &[u16]) -> u32 {
    ((registers[1] as u32) << 16) | registers[0] as u32
}

fn split_words(value: u32) -> Vec<u16> {
    vec![(value & 0xFFFF) as u16, (value >> 16) as u16]
}

fn to_integer(raw: f64, min: f64, max: f64, tag: &Tag) -> Result<i64, CodecError> {
    let rounded = raw.round();
    if rounded < min || rounded > max {
        return Err(CodecError::OutOfRange {
            tag: tag.name.clone(),
            data_type: tag.data_type,
            value: raw,
        });
    }
    Ok(rounded as i64)
}
