use super::Interpreter;
use crate::belt::{BeltNum, BeltSlice, SliceBuffer, Width};
use crate::error::TrapReason;
use crate::instruction::{Break, SliceOpKind};

impl Interpreter {
    pub(crate) fn push_ram(&mut self) -> Result<Option<Break>, TrapReason> {
        let length = self.ram.len();
        self.belt.push(BeltSlice::new(SliceBuffer::Ram, 0, length));
        Ok(None)
    }

    pub(crate) fn push_data(&mut self, index: usize) -> Result<Option<Break>, TrapReason> {
        let selected = self.belt.get_num(index)?.expect_value()?;
        let selected =
            usize::try_from(selected).map_err(|_| TrapReason::DataIndexOutOfRange)?;
        let buffer = self
            .data
            .get(selected)
            .ok_or(TrapReason::DataIndexOutOfRange)?;
        let length = buffer.len();
        self.belt
            .push(BeltSlice::new(SliceBuffer::Data(selected), 0, length));
        Ok(None)
    }

    pub(crate) fn slice_len(&mut self, index: usize) -> Result<Option<Break>, TrapReason> {
        let slice = self.belt.get_slice(index)?;
        self.belt.push(BeltNum::new(Width::W32, slice.len() as u64));
        Ok(None)
    }

    pub(crate) fn slice_op(
        &mut self,
        slice: usize,
        count: usize,
        op: SliceOpKind,
    ) -> Result<Option<Break>, TrapReason> {
        let slc = self.belt.get_slice(slice)?;
        let count = self.belt.get_num(count)?.expect_value()?;
        let trimmed = match op {
            SliceOpKind::TrimLeft => slc.trim_l(count)?,
            SliceOpKind::TrimRight => slc.trim_r(count)?,
            SliceOpKind::Shrink => slc.shrink(count)?,
        };
        self.belt.push(trimmed);
        Ok(None)
    }

    pub(crate) fn subslice(
        &mut self,
        slice: usize,
        start: usize,
        length: usize,
    ) -> Result<Option<Break>, TrapReason> {
        let slc = self.belt.get_slice(slice)?;
        let start = self.belt.get_num(start)?.expect_value()?;
        let length = self.belt.get_num(length)?.expect_value()?;
        let sub = slc.subslice(start, length)?;
        self.belt.push(sub);
        Ok(None)
    }

    pub(crate) fn load(
        &mut self,
        width: Width,
        slice: usize,
        offset: usize,
    ) -> Result<Option<Break>, TrapReason> {
        let slc = self.belt.get_slice(slice)?;
        let num_bytes = width.num_bytes();
        // An overrunning read is a program-visible failure, not a trap.
        let overruns = offset
            .checked_add(num_bytes)
            .map_or(true, |end| end > slc.len());
        let num = if overruns {
            BeltNum::err(width)
        } else {
            let start = slc.start() + offset;
            let bytes = &self.buffer(slc)?[start..start + num_bytes];
            let mut raw = [0u8; 8];
            raw[..num_bytes].copy_from_slice(bytes);
            BeltNum::new(width, u64::from_le_bytes(raw))
        };
        self.belt.push(num);
        Ok(None)
    }

    pub(crate) fn store(
        &mut self,
        value: usize,
        slice: usize,
        offset: usize,
    ) -> Result<Option<Break>, TrapReason> {
        let num = self.belt.get_num(value)?;
        let slc = self.belt.get_slice(slice)?;
        // Storing the error sentinel is a silent no-op, even through an
        // immutable slice.
        let Some(raw) = num.value() else {
            return Ok(None);
        };
        if !matches!(slc.buffer(), SliceBuffer::Ram) {
            return Err(TrapReason::ImmutableSliceWrite);
        }
        let num_bytes = num.width().num_bytes();
        let overruns = offset
            .checked_add(num_bytes)
            .map_or(true, |end| end > slc.len());
        if overruns {
            return Err(TrapReason::StoreOutOfBounds);
        }
        let start = slc.start() + offset;
        self.ram[start..start + num_bytes].copy_from_slice(&raw.to_le_bytes()[..num_bytes]);
        Ok(None)
    }

    fn buffer(&self, slice: BeltSlice) -> Result<&[u8], TrapReason> {
        match slice.buffer() {
            SliceBuffer::Ram => Ok(&self.ram),
            SliceBuffer::Data(index) => self
                .data
                .get(index)
                .map(Vec::as_slice)
                .ok_or(TrapReason::DataIndexOutOfRange),
        }
    }
}
