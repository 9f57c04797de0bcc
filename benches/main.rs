use criterion::{BenchmarkId, Criterion};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};
use yao_runtime::{
    config::{EngineConfig, Mode},
    interpreter::{Instruction, Program},
    protocol::simulate_yao,
};

/// A chain of `n` AND gates, each combining the previous result with a garbler or evaluator bit.
fn and_chain(n: usize) -> Program {
    let mut instructions = vec![
        Instruction::InputGarbler(0),
        Instruction::InputEvaluator(1),
    ];
    for i in 0..n {
        instructions.push(Instruction::And {
            dst: 2,
            lhs: if i == 0 { 0 } else { 2 },
            rhs: i % 2,
        });
        instructions.push(Instruction::Xor {
            dst: 2,
            lhs: 2,
            rhs: 1 - i % 2,
        });
    }
    instructions.push(Instruction::Reveal {
        dst: 0,
        src: vec![2],
    });
    Program::new(instructions, 0).expect("valid program")
}

/// Counts down from the evaluator's 8-bit input, revealing the counter's zero flag on every
/// iteration and restarting once per reveal.
fn branching_loop() -> Program {
    let mut instructions = vec![];
    for i in 0..8 {
        instructions.push(Instruction::InputEvaluator(i));
    }
    instructions.push(Instruction::InputGarbler(8));
    // loop header at 9: flag = any bit set
    let header = instructions.len();
    instructions.push(Instruction::Not { dst: 9, src: 0 });
    for i in 1..8 {
        instructions.push(Instruction::Not { dst: 10, src: i });
        instructions.push(Instruction::And {
            dst: 9,
            lhs: 9,
            rhs: 10,
        });
    }
    instructions.push(Instruction::Not { dst: 9, src: 9 });
    instructions.push(Instruction::Reveal {
        dst: 0,
        src: vec![9],
    });
    let exit = instructions.len() + 1 + 2 + 8 * 4 + 1;
    instructions.push(Instruction::JumpIfZero { cond: 0, target: exit });
    // decrement: borrow starts at 1
    instructions.push(Instruction::Xor {
        dst: 11,
        lhs: 8,
        rhs: 8,
    });
    instructions.push(Instruction::Not { dst: 11, src: 11 });
    for i in 0..8 {
        instructions.push(Instruction::Not { dst: 12, src: i });
        instructions.push(Instruction::And {
            dst: 12,
            lhs: 12,
            rhs: 11,
        });
        instructions.push(Instruction::Xor {
            dst: i,
            lhs: i,
            rhs: 11,
        });
        instructions.push(Instruction::Xor {
            dst: 11,
            lhs: 12,
            rhs: 8,
        });
    }
    instructions.push(Instruction::Jump(header));
    Program::new(instructions, 0).expect("valid program")
}

fn protocol_benchmarks(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("and_chain");
    for n in [1_000, 10_000] {
        let program = and_chain(n);
        for mode in [Mode::Continuous, Mode::Buffered] {
            let config = EngineConfig::default().with_mode(mode).with_time_slice(1024);
            group.bench_with_input(BenchmarkId::new(mode.to_string(), n), &program, |b, p| {
                b.iter(|| {
                    runtime
                        .block_on(simulate_yao(p, &[true], &[true], &config))
                        .expect("simulation succeeds")
                })
            });
        }
    }
    group.finish();

    let program = branching_loop();
    let config = EngineConfig::default();
    let counter = [true, false, true, false, false, false, false, false];
    c.bench_function("branching_loop_countdown_5", |b| {
        b.iter(|| {
            runtime
                .block_on(simulate_yao(&program, &[false], &counter, &config))
                .expect("simulation succeeds")
        })
    });
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .init();

    let mut c = Criterion::default()
        .significance_level(0.1)
        .sample_size(10)
        .configure_from_args();

    protocol_benchmarks(&mut c);

    c.final_summary();
}
