use super::Primitive;
use crate::interpreter::engine::{Trap, VirtualMachine};
use crate::interpreter::errors::Fault;
use crate::interpreter::opcodes::TypedOp;
use crate::memory::StackEntry;
use std::cmp::Ordering;

impl VirtualMachine<'_> {
    /// Execute one operation of the `T` family.
    ///
    /// Binary operations pop the right operand first. Comparisons push an Int
    /// in both families.
    pub(crate) fn execute_typed<T: Primitive>(&mut self, op: TypedOp) -> Result<(), Trap> {
        match op {
            TypedOp::Push => {
                let value = T::fetch(self)?;
                self.push(value)?;
            }
            TypedOp::Pop => {
                T::pop(&mut self.operands)?;
            }
            TypedOp::Dup => {
                let value = T::pop(&mut self.operands)?;
                self.push(value)?;
                self.push(value)?;
            }

            TypedOp::Add => self.binary::<T>(|a, b| a.add(b))?,
            TypedOp::Sub => self.binary::<T>(|a, b| a.sub(b))?,
            TypedOp::Mul => self.binary::<T>(|a, b| a.mul(b))?,
            TypedOp::Div | TypedOp::Mod => {
                let rhs = T::pop(&mut self.operands)?;
                let lhs = T::pop(&mut self.operands)?;
                if rhs == T::ZERO {
                    return Err(Fault::DivisionByZero.into());
                }
                let result = if op == TypedOp::Div {
                    lhs.div(rhs)
                } else {
                    lhs.rem(rhs)
                };
                self.push(result)?;
            }
            TypedOp::Xor => self.binary::<T>(|a, b| a ^ b)?,
            TypedOp::And => self.binary::<T>(|a, b| a & b)?,
            TypedOp::Or => self.binary::<T>(|a, b| a | b)?,
            TypedOp::Not => {
                let value = T::pop(&mut self.operands)?;
                self.push(!value)?;
            }
            TypedOp::Shl => self.binary::<T>(|a, b| a.shl(b))?,
            TypedOp::Shr => self.binary::<T>(|a, b| a.shr(b))?,

            TypedOp::Cmp => self.compare::<T>(|ordering| match ordering {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            })?,
            TypedOp::Less => self.compare::<T>(|o| (o == Ordering::Less) as i32)?,
            TypedOp::LessEq => self.compare::<T>(|o| (o != Ordering::Greater) as i32)?,
            TypedOp::Greater => self.compare::<T>(|o| (o == Ordering::Greater) as i32)?,
            TypedOp::GreaterEq => self.compare::<T>(|o| (o != Ordering::Less) as i32)?,
            TypedOp::Eq => self.compare::<T>(|o| (o == Ordering::Equal) as i32)?,
            TypedOp::NotEq => self.compare::<T>(|o| (o != Ordering::Equal) as i32)?,

            TypedOp::LoadLocal => {
                let offset = self.fetch_i32()?;
                let address = self.local_address(offset, T::KIND.size())?;
                let value = T::read(self.heap, address)?;
                self.push(value)?;
            }
            TypedOp::StoreLocal => {
                let offset = self.fetch_i32()?;
                let address = self.local_address(offset, T::KIND.size())?;
                let value = T::pop(&mut self.operands)?;
                value.write(self.heap, address)?;
            }
            TypedOp::LoadGlobal => {
                let index = self.fetch_i32()?;
                let address = self.global_address(index)?;
                let value = T::read(self.heap, address)?;
                self.push(value)?;
            }
            TypedOp::StoreGlobal => {
                let index = self.fetch_i32()?;
                let address = self.global_address(index)?;
                let value = T::pop(&mut self.operands)?;
                value.write(self.heap, address)?;
            }
            TypedOp::Load => {
                let address = self.pop_address()?;
                let value = T::read(self.heap, address)?;
                self.push(value)?;
            }
            TypedOp::Store => {
                let value = T::pop(&mut self.operands)?;
                let address = self.pop_address()?;
                value.write(self.heap, address)?;
            }
            TypedOp::Out => {
                let value = T::pop(&mut self.operands)?;
                self.io.print(&value.render());
            }
        }

        Ok(())
    }

    fn push<T: Primitive>(&mut self, value: T) -> Result<(), Fault> {
        self.operands.push(value.into_entry())
    }

    fn binary<T: Primitive>(&mut self, op: impl FnOnce(T, T) -> T) -> Result<(), Fault> {
        let rhs = T::pop(&mut self.operands)?;
        let lhs = T::pop(&mut self.operands)?;
        self.push(op(lhs, rhs))
    }

    fn compare<T: Primitive>(&mut self, op: impl FnOnce(Ordering) -> i32) -> Result<(), Fault> {
        let rhs = T::pop(&mut self.operands)?;
        let lhs = T::pop(&mut self.operands)?;
        self.operands.push(StackEntry::Int(op(lhs.cmp(&rhs))))
    }
}
