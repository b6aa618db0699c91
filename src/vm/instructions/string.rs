use crate::utils::number::SpecialOps;
use crate::vm::flags;
use crate::vm::modrm::ModRM;
use crate::vm::runtime::CpuFlag::*;
use crate::vm::runtime::Runtime;

/// Moves SI and/or DI one element forward or backward per DF.
#[inline]
fn advance<T: SpecialOps>(vm: &mut Runtime, si: bool, di: bool) {
    let step = (T::BITS / 8) as u16;
    let operation: fn(u16, u16) -> u16 = if vm.cpu.check_flag(Directional) {
        u16::wrapping_sub
    } else {
        u16::wrapping_add
    };
    if si {
        vm.cpu.registers.si.operation(step, operation);
    }
    if di {
        vm.cpu.registers.di.operation(step, operation);
    }
}

/// Runs `body` once, or CX times under a REP prefix. `body` returns
/// `false` to stop a conditional repeat early.
#[inline]
fn repeat(vm: &mut Runtime, mut body: impl FnMut(&mut Runtime) -> bool) {
    if vm.cpu.rep.is_none() {
        body(vm);
        return;
    }
    while vm.cpu.registers.cx.word() != 0 {
        let proceed = body(vm);
        vm.cpu.registers.cx.operation(1, u16::wrapping_sub);
        if !proceed {
            break;
        }
    }
}

#[inline]
fn source<T: ModRM>(vm: &Runtime) -> T {
    T::read_memory(&vm.memory, vm.data_segment(), vm.cpu.registers.si.word())
}

#[inline]
fn destination<T: ModRM>(vm: &Runtime) -> T {
    T::read_memory(&vm.memory, vm.cpu.registers.es.word(), vm.cpu.registers.di.word())
}

/// REPE stops on ZF clear, REPNE on ZF set.
#[inline]
fn keep_comparing(vm: &Runtime) -> bool {
    match vm.cpu.rep {
        Some(while_equal) => vm.cpu.check_flag(Zero) == while_equal,
        None => false,
    }
}

pub(super) fn movs<T: ModRM>(vm: &mut Runtime) {
    repeat(vm, |vm| {
        let value = source::<T>(vm);
        let es = vm.cpu.registers.es.word();
        T::write_memory(&mut vm.memory, es, vm.cpu.registers.di.word(), value);
        advance::<T>(vm, true, true);
        true
    });
}

pub(super) fn cmps<T: ModRM>(vm: &mut Runtime) {
    repeat(vm, |vm| {
        let lhs = source::<T>(vm);
        let rhs = destination::<T>(vm);
        flags::sub(&mut vm.cpu, lhs, rhs, false);
        advance::<T>(vm, true, true);
        keep_comparing(vm)
    });
}

pub(super) fn stos<T: ModRM>(vm: &mut Runtime) {
    repeat(vm, |vm| {
        let value = T::read_register(&vm.cpu.registers, 0);
        let es = vm.cpu.registers.es.word();
        T::write_memory(&mut vm.memory, es, vm.cpu.registers.di.word(), value);
        advance::<T>(vm, false, true);
        true
    });
}

pub(super) fn lods<T: ModRM>(vm: &mut Runtime) {
    repeat(vm, |vm| {
        let value = source::<T>(vm);
        T::write_register(&mut vm.cpu.registers, 0, value);
        advance::<T>(vm, true, false);
        true
    });
}

pub(super) fn scas<T: ModRM>(vm: &mut Runtime) {
    repeat(vm, |vm| {
        let acc = T::read_register(&vm.cpu.registers, 0);
        let value = destination::<T>(vm);
        flags::sub(&mut vm.cpu, acc, value, false);
        advance::<T>(vm, false, true);
        keep_comparing(vm)
    });
}
