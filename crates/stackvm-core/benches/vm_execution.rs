use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stackvm_bytecode::{BytecodeWriter, JumpCondition, Opcode, Program, Register};
use stackvm_core::{DumpSink, GuardedStack, StackOptions, Vm, VmOptions};
use std::io::{self, Cursor};

/// `ax = n; loop: ax = ax - 1; if ax > 0 goto loop; end`
fn countdown(n: i32) -> Program {
    let mut w = BytecodeWriter::new();
    w.emit_in_reg_const(Register::Ax, n);
    let top = w.offset() as u8;
    w.emit_push_reg(Register::Ax);
    w.emit_push(1);
    w.emit_opcode(Opcode::Sub);
    w.emit_pop_reg(Register::Ax);
    w.emit_push_reg(Register::Ax);
    w.emit_push(0);
    w.emit_jump(JumpCondition::GreaterThan, top);
    w.emit_opcode(Opcode::End);
    w.into()
}

fn bench_countdown(c: &mut Criterion) {
    let mut group = c.benchmark_group("countdown");

    for n in [10, 100, 1000] {
        let program = countdown(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &program, |b, program| {
            b.iter(|| {
                let options = VmOptions {
                    poison: Some(i32::MIN),
                    dump_sink: DumpSink::Discard,
                    ..VmOptions::default()
                };
                let mut vm = Vm::with_io(
                    black_box(program.clone()),
                    options,
                    Cursor::new(Vec::new()),
                    io::sink(),
                );
                vm.run().unwrap();
                vm.steps()
            });
        });
    }

    group.finish();
}

fn bench_guarded_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("guarded_stack");

    for depth in [16, 256] {
        group.bench_with_input(BenchmarkId::new("push_pop", depth), &depth, |b, &depth| {
            b.iter(|| {
                let mut stack = GuardedStack::new(StackOptions {
                    poison: Some(i32::MIN),
                    sink: DumpSink::Discard,
                    ..StackOptions::default()
                });
                for value in 0..depth {
                    stack.push(black_box(value)).unwrap();
                }
                while stack.try_pop().is_ok() {}
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_countdown, bench_guarded_stack);
criterion_main!(benches);
