use super::Interpreter;
use crate::belt::{BeltNum, Width};
use crate::error::TrapReason;
use crate::instruction::{ArithMode, ArithOp, Break, CastKind, Operand, RelOp};

use num_integer::Integer;

impl ArithOp {
    /// Evaluate in the unbounded signed domain. `None` marks an
    /// undefined or unrepresentable result (division by zero, negative
    /// shift count, magnitude past any belt width), which checked
    /// arithmetic maps to the error sentinel.
    pub(crate) fn apply(self, a: i128, b: i128) -> Option<i128> {
        match self {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
            ArithOp::Div => (b != 0).then(|| Integer::div_floor(&a, &b)),
            ArithOp::Rem => (b != 0).then(|| Integer::mod_floor(&a, &b)),
            ArithOp::Shl => shl(a, b),
            ArithOp::Shr => shr(a, b),
            ArithOp::And => Some(a & b),
            ArithOp::Or => Some(a | b),
            ArithOp::Xor => Some(a ^ b),
        }
    }

    /// The result's two's-complement bit pattern for the widening mode.
    /// Multiplication wraps through `u128` so the full double-width
    /// pattern of 64-bit operands survives.
    fn widening_bits(self, a: i128, b: i128) -> Option<u128> {
        let (a_bits, b_bits) = (a as u128, b as u128);
        match self {
            ArithOp::Add => Some(a_bits.wrapping_add(b_bits)),
            ArithOp::Sub => Some(a_bits.wrapping_sub(b_bits)),
            ArithOp::Mul => Some(a_bits.wrapping_mul(b_bits)),
            op => op.apply(a, b).map(|v| v as u128),
        }
    }
}

fn shl(a: i128, b: i128) -> Option<i128> {
    if b < 0 {
        return None;
    }
    if a == 0 {
        return Some(0);
    }
    if b > 126 {
        return None;
    }
    a.checked_mul(1i128 << b)
}

fn shr(a: i128, b: i128) -> Option<i128> {
    if b < 0 {
        return None;
    }
    Some(a >> b.min(127))
}

impl Interpreter {
    pub(crate) fn arith(
        &mut self,
        a: Operand,
        b: Operand,
        is_signed: bool,
        mode: ArithMode,
        op: ArithOp,
    ) -> Result<Option<Break>, TrapReason> {
        let (a, width_a) = self.operand(a, is_signed)?;
        let (b, width_b) = self.operand(b, is_signed)?;
        let width = match (width_a, width_b) {
            (Some(wa), Some(wb)) => wa.promote(wb),
            (Some(w), None) | (None, Some(w)) => w,
            (None, None) => Width::W8,
        };

        // Any Err operand yields a single Err result, whatever the mode.
        let (Some(a), Some(b)) = (a, b) else {
            self.belt.push(BeltNum::err(width));
            return Ok(None);
        };

        match mode {
            ArithMode::Checked => {
                let result = op.apply(a, b).filter(|r| {
                    *r >= width.min_value(is_signed) && *r <= width.max_value(is_signed)
                });
                self.belt.push(match result {
                    Some(r) => BeltNum::from_signed(r, width),
                    None => BeltNum::err(width),
                });
            }
            ArithMode::Widening => match op.widening_bits(a, b) {
                None => self.belt.push(BeltNum::err(width)),
                Some(bits) => {
                    let lo = bits as u64 & width.mask();
                    let hi = (bits >> width.bits()) as u64 & width.mask();
                    // Low half first, so the high half lands at belt[0].
                    self.belt.push(BeltNum::new(width, lo));
                    self.belt.push(BeltNum::new(width, hi));
                }
            },
        }
        Ok(None)
    }

    pub(crate) fn divmod(
        &mut self,
        a: usize,
        b: usize,
        is_signed: bool,
    ) -> Result<Option<Break>, TrapReason> {
        let a_num = self.belt.get_num(a)?;
        let b_num = self.belt.get_num(b)?;
        let width = a_num.width().promote(b_num.width());

        let (Some(a), Some(b)) = (a_num.to_signed(is_signed), b_num.to_signed(is_signed)) else {
            self.belt.push(BeltNum::err(width));
            return Ok(None);
        };

        let (quotient, remainder) = if b == 0 {
            (None, None)
        } else {
            (
                Some(Integer::div_floor(&a, &b)),
                Some(Integer::mod_floor(&a, &b)),
            )
        };
        let bounded = |value: Option<i128>| {
            value
                .filter(|v| *v >= width.min_value(is_signed) && *v <= width.max_value(is_signed))
                .map_or(BeltNum::err(width), |v| BeltNum::from_signed(v, width))
        };
        // Remainder first, so the quotient lands at belt[0].
        self.belt.push(bounded(remainder));
        self.belt.push(bounded(quotient));
        Ok(None)
    }

    pub(crate) fn rel(
        &mut self,
        a: usize,
        b: usize,
        is_signed: bool,
        op: RelOp,
    ) -> Result<Option<Break>, TrapReason> {
        let a = self.belt.get_num(a)?.to_signed(is_signed);
        let b = self.belt.get_num(b)?.to_signed(is_signed);
        self.belt.push(match (a, b) {
            (Some(a), Some(b)) => BeltNum::new(Width::W8, op.apply(a, b) as u64),
            _ => BeltNum::err(Width::W8),
        });
        Ok(None)
    }

    pub(crate) fn rel_verify(
        &mut self,
        a: usize,
        b: usize,
        is_signed: bool,
        op: RelOp,
    ) -> Result<Option<Break>, TrapReason> {
        let a = self.belt.get_num(a)?.to_signed(is_signed);
        let b = self.belt.get_num(b)?.to_signed(is_signed);
        match (a, b) {
            (Some(a), Some(b)) if op.apply(a, b) => Ok(None),
            _ => Err(TrapReason::VerifyFailed),
        }
    }

    pub(crate) fn convert(
        &mut self,
        value: usize,
        width: Width,
        is_signed: bool,
        kind: CastKind,
    ) -> Result<Option<Break>, TrapReason> {
        let num = self.belt.get_num(value)?;
        let converted = match kind {
            CastKind::Wrap => num.wrap(width)?,
            CastKind::Saturating => num.cast_sat(width, is_signed)?,
            CastKind::Checked => num.cast_checked(width, is_signed)?,
            CastKind::Extend => num.extend(width, is_signed)?,
        };
        self.belt.push(converted);
        Ok(None)
    }

    fn operand(
        &self,
        operand: Operand,
        is_signed: bool,
    ) -> Result<(Option<i128>, Option<Width>), TrapReason> {
        match operand {
            Operand::Belt(index) => {
                let num = self.belt.get_num(index)?;
                Ok((num.to_signed(is_signed), Some(num.width())))
            }
            Operand::Imm(value) => Ok((Some(value as i128), None)),
        }
    }
}
