//! 请求合并：同一功能码下地址连续的点位合并为一次多寄存器读取。

use domain::{DataType, Tag};
use std::collections::BTreeMap;

/// 单次读取寄存器上限（FC03/FC04）。
pub const MAX_READ_REGISTERS: u16 = 125;

/// 单次读取位上限（FC01/FC02）。
pub const MAX_READ_BITS: u16 = 2000;

/// Modbus 读功能码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionCode {
    /// 读线圈状态 (0x01)
    ReadCoils = 1,
    /// 读离散输入 (0x02)
    ReadDiscreteInputs = 2,
    /// 读保持寄存器 (0x03)
    ReadHoldingRegisters = 3,
    /// 读输入寄存器 (0x04)
    ReadInputRegisters = 4,
}

impl FunctionCode {
    /// 数据类型对应的读功能码。
    pub fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Coil => Self::ReadCoils,
            DataType::DiscreteInput => Self::ReadDiscreteInputs,
            DataType::InputRegister => Self::ReadInputRegisters,
            DataType::HoldingRegister
            | DataType::Uint16
            | DataType::Int16
            | DataType::Uint32
            | DataType::Int32
            | DataType::Float32 => Self::ReadHoldingRegisters,
        }
    }

    pub fn max_quantity(self) -> u16 {
        match self {
            Self::ReadCoils | Self::ReadDiscreteInputs => MAX_READ_BITS,
            Self::ReadHoldingRegisters | Self::ReadInputRegisters => MAX_READ_REGISTERS,
        }
    }

    pub fn is_bits(self) -> bool {
        matches!(self, Self::ReadCoils | Self::ReadDiscreteInputs)
    }
}

/// 合并后的读请求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub function: FunctionCode,
    pub start: u16,
    pub count: u16,
    /// 覆盖的点位在原始切片中的下标
    pub members: Vec<usize>,
}

impl ReadRequest {
    fn end(&self) -> u32 {
        self.start as u32 + self.count as u32 - 1
    }
}

/// 生成读请求：按功能码分组、按地址排序，连续或重叠的区间合并，受协议上限约束。
pub fn plan_requests(tags: &[Tag]) -> Vec<ReadRequest> {
    let mut by_function: BTreeMap<FunctionCode, Vec<usize>> = BTreeMap::new();
    for (index, tag) in tags.iter().enumerate() {
        by_function
            .entry(FunctionCode::for_data_type(tag.data_type))
            .or_default()
            .push(index);
    }

    let mut requests = Vec::new();
    for (function, mut indices) in by_function {
        indices.sort_by_key(|&index| (tags[index].address, tags[index].end_address()));
        let limit = function.max_quantity() as u32;
        let mut current: Option<ReadRequest> = None;

        for index in indices {
            let tag = &tags[index];
            let start = tag.address as u32;
            let end = tag.end_address();

            if let Some(request) = current.as_mut() {
                let merged_end = request.end().max(end);
                if start <= request.end() + 1 && merged_end - request.start as u32 + 1 <= limit {
                    request.count = (merged_end - request.start as u32 + 1) as u16;
                    request.members.push(index);
                    continue;
                }
            }
            if let Some(done) = current.take() {
                requests.push(done);
            }
            current = Some(ReadRequest {
                function,
                start: tag.address,
                count: tag.size.max(1),
                members: vec![index],
            });
        }
        if let Some(done) = current {
            requests.push(done);
        }
    }
    requests
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_registers_are_merged() {
        let tags = vec![
            Tag::new("a", 100, DataType::Uint16),
            Tag::new("b", 101, DataType::Float32),
            Tag::new("c", 103, DataType::Int16),
            Tag::new("far", 200, DataType::Uint16),
        ];
        let requests = plan_requests(&tags);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].start, 100);
        assert_eq!(requests[0].count, 4);
        assert_eq!(requests[0].members, vec![0, 1, 2]);
        assert_eq!(requests[1].start, 200);
        assert_eq!(requests[1].count, 1);
    }

    #[test]
    fn functions_are_never_mixed() {
        let tags = vec![
            Tag::new("holding", 10, DataType::HoldingRegister),
            Tag::new("input", 11, DataType::InputRegister),
            Tag::new("coil", 12, DataType::Coil),
            Tag::new("discrete", 13, DataType::DiscreteInput),
        ];
        let requests = plan_requests(&tags);
        assert_eq!(requests.len(), 4);
        let functions: Vec<FunctionCode> = requests.iter().map(|r| r.function).collect();
        assert_eq!(
            functions,
            vec![
                FunctionCode::ReadCoils,
                FunctionCode::ReadDiscreteInputs,
                FunctionCode::ReadHoldingRegisters,
                FunctionCode::ReadInputRegisters,
            ]
        );
    }

    #[test]
    fn register_limit_splits_requests() {
        let tags: Vec<Tag> = (0..130u16)
            .map(|offset| Tag::new(format!("r{}", offset), 1 + offset, DataType::Uint16))
            .collect();
        let requests = plan_requests(&tags);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].count, MAX_READ_REGISTERS);
        assert_eq!(requests[1].start, 1 + MAX_READ_REGISTERS);
        assert_eq!(requests[1].count, 5);
    }

    #[test]
    fn wide_tag_is_not_split_across_limit() {
        let mut tags: Vec<Tag> = (0..124u16)
            .map(|offset| Tag::new(format!("r{}", offset), 1 + offset, DataType::Uint16))
            .collect();
        tags.push(Tag::new("wide", 125, DataType::Uint32));
        let requests = plan_requests(&tags);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].count, 124);
        assert_eq!(requests[1].start, 125);
        assert_eq!(requests[1].count, 2);
    }

    #[test]
    fn unsorted_and_gapped_input() {
        let tags = vec![
            Tag::new("c", 30, DataType::Coil),
            Tag::new("a", 10, DataType::Coil),
            Tag::new("b", 11, DataType::Coil),
        ];
        let requests = plan_requests(&tags);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].members, vec![1, 2]);
        assert_eq!(requests[1].members, vec![0]);
    }
}
