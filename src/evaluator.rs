//! The evaluator role (party 1).

use std::{collections::VecDeque, marker::PhantomData, path::PathBuf};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{Level, debug, instrument};

use crate::{
    channel::{Channel, MsgChannel},
    codec::{BatchCursor, GateBatch, MaskBatch, recv_batch},
    config::{ConfigError, EngineConfig, Role},
    data_types::Label,
    garble::evaluate_and,
    interpreter::{Backend, Break, InterpreterError, Memory, Processor, Program},
    keys::WireKeySource,
    mode::{Buffered, Continuous, Strategy, handshake},
    ot::OtExtension,
    protocol::{Error, GARBLER, Outputs, ProtocolViolation},
    store::ReplayStores,
};

/// Evaluates the garbled gates received from the garbler.
pub struct Evaluator<C: Channel, S: Strategy = Continuous> {
    channel: MsgChannel<C>,
    keys: WireKeySource,
    state: EvaluatorState,
    seq: u64,
    time_slice: usize,
    store_dir: Option<PathBuf>,
    _strategy: PhantomData<S>,
}

#[derive(Default)]
struct EvaluatorState {
    inputs: VecDeque<bool>,
    cursor: BatchCursor,
    gate_counter: u64,
    private: Vec<u64>,
}

impl EvaluatorState {
    fn decode(&mut self, wires: &[Label]) -> Result<u64, Error> {
        let mut value = 0;
        for (i, wire) in wires.iter().enumerate() {
            let bit = self.cursor.next_mask()?.decode(*wire);
            value |= (bit as u64) << i;
        }
        Ok(value)
    }

    /// Takes the choice bits for the next `count` evaluator input wires.
    fn take_choices(&mut self, count: u64) -> Result<Vec<bool>, Error> {
        let count = usize::try_from(count)
            .ok()
            .filter(|count| *count <= self.inputs.len())
            .ok_or(InterpreterError::MissingEvaluatorInput)?;
        Ok(self.inputs.drain(..count).collect())
    }
}

impl Backend for EvaluatorState {
    fn input_garbler(&mut self) -> Result<Label, Error> {
        Ok(self.cursor.next_garbler_input()?)
    }

    fn input_evaluator(&mut self) -> Result<Label, Error> {
        Ok(self.cursor.next_evaluator_input()?)
    }

    fn and(&mut self, lhs: Label, rhs: Label) -> Result<Label, Error> {
        let gate = self.cursor.next_gate()?;
        let label = evaluate_and(lhs, rhs, &gate, self.gate_counter);
        self.gate_counter += 1;
        Ok(label)
    }

    fn not(&mut self, src: Label) -> Label {
        src
    }

    fn reveal(&mut self, wires: &[Label]) -> Result<Option<u64>, Error> {
        self.decode(wires).map(Some)
    }

    fn private_output(&mut self, wires: &[Label]) -> Result<(), Error> {
        let value = self.decode(wires)?;
        self.private.push(value);
        Ok(())
    }
}

impl<C: Channel, S: Strategy> Evaluator<C, S> {
    /// Agrees on the configuration with the garbler and sets up the OT extension.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn new(channel: C, config: &EngineConfig) -> Result<Self, Error> {
        let mut channel = MsgChannel(channel);
        handshake::<S>(&mut channel, GARBLER, config).await?;
        let mut rng = ChaCha20Rng::from_os_rng();
        let mut keys = WireKeySource::new(GARBLER, OtExtension::default());
        keys.setup(&mut channel, None, &mut rng).await?;
        Ok(Self {
            channel,
            keys,
            state: EvaluatorState::default(),
            seq: 0,
            time_slice: config.time_slice,
            store_dir: config.store_dir.clone(),
            _strategy: PhantomData,
        })
    }

    /// Checks that `gates` is the next batch of the run.
    fn check_position(&self, gates: &GateBatch) -> Result<(), ProtocolViolation> {
        if gates.seq != self.seq {
            return Err(ProtocolViolation::OutOfOrderBatch {
                expected: self.seq,
                actual: gates.seq,
            });
        }
        if gates.first_gate != self.state.gate_counter {
            return Err(ProtocolViolation::UnexpectedGateIndex {
                expected: self.state.gate_counter,
                actual: gates.first_gate,
            });
        }
        Ok(())
    }

    /// Makes a batch pair the current one.
    fn load(
        &mut self,
        gates: GateBatch,
        masks: MaskBatch,
        labels: Vec<Label>,
    ) -> Result<(), ProtocolViolation> {
        self.check_position(&gates)?;
        self.state.cursor = BatchCursor::new(gates, masks, labels)?;
        self.seq += 1;
        Ok(())
    }

    fn execute_slice(
        &mut self,
        program: &Program,
        processor: &mut Processor,
        memory: &mut Memory,
    ) -> Result<Break, Error> {
        program.execute(processor, memory, &mut self.state, self.time_slice)
    }

    async fn receive_input_labels(&mut self, count: u64) -> Result<Vec<Label>, Error> {
        if count == 0 {
            return Ok(vec![]);
        }
        let choices = self.state.take_choices(count)?;
        self.keys.receive(&mut self.channel, &choices).await
    }

    async fn send_openings(&mut self, processor: &mut Processor) -> Result<(), Error> {
        let openings = processor.take_openings();
        self.channel.send_to(GARBLER, "openings", &openings).await?;
        Ok(())
    }

    async fn finish(mut self, mut processor: Processor) -> Result<Outputs, Error> {
        self.send_openings(&mut processor).await?;
        debug!(batches = self.seq, gates = self.state.gate_counter, "evaluation done");
        Ok(Outputs {
            revealed: processor.revealed_values(),
            private: self.state.private,
        })
    }
}

impl<C: Channel> Evaluator<C, Continuous> {
    /// Evaluates each batch as soon as it arrives.
    ///
    /// After a restart request the pending revealed values are opened to the garbler, and the
    /// next batch continues from the tainted instruction.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn run(mut self, program: &Program, inputs: &[bool]) -> Result<Outputs, Error> {
        self.state.inputs = inputs.iter().copied().collect();
        let mut processor = program.processor();
        let mut memory = program.memory();
        loop {
            let Some((gates, masks)) = recv_batch(&mut self.channel, GARBLER).await? else {
                return Err(ProtocolViolation::UnexpectedDone.into());
            };
            self.check_position(&gates)?;
            let labels = self.receive_input_labels(gates.evaluator_inputs).await?;
            self.load(gates, masks, labels)?;
            let brk = self.execute_slice(program, &mut processor, &mut memory)?;
            self.state.cursor.finish()?;
            match brk {
                Break::Restart => {
                    processor.rewind();
                    debug!(
                        pc = processor.pc(),
                        pending = processor.pending_openings(),
                        "opening pending values before restart"
                    );
                    self.send_openings(&mut processor).await?;
                }
                Break::Time => {}
                Break::Done => break,
            }
        }
        if recv_batch(&mut self.channel, GARBLER).await?.is_some() {
            return Err(ProtocolViolation::MissingDone.into());
        }
        self.finish(processor).await
    }
}

impl<C: Channel> Evaluator<C, Buffered> {
    /// Receives every batch into the replay stores, until the garbler sends `DONE`.
    async fn drain(&mut self) -> Result<ReplayStores, Error> {
        let mut stores = ReplayStores::new(self.store_dir.as_deref())?;
        while let Some((gates, masks)) = recv_batch(&mut self.channel, GARBLER).await? {
            stores.push(gates, masks)?;
        }
        for count in stores.take_input_counts() {
            let labels = self.receive_input_labels(count).await?;
            stores.push_input_labels(labels);
        }
        debug!(batches = stores.remaining(), "drained garbler output");
        Ok(stores)
    }

    /// Fetches the whole run first, then replays the stored batches one slice at a time.
    ///
    /// Fails with [`ConfigError::RestartInBufferedMode`] if the program depends on a revealed
    /// value.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn run(mut self, program: &Program, inputs: &[bool]) -> Result<Outputs, Error> {
        self.state.inputs = inputs.iter().copied().collect();
        let mut stores = self.drain().await?;
        let mut processor = program.processor();
        let mut memory = program.memory();
        loop {
            let (gates, masks, labels) = stores.pop(self.seq)?;
            self.load(gates, masks, labels)?;
            match self.execute_slice(program, &mut processor, &mut memory)? {
                Break::Restart => {
                    return Err(ConfigError::RestartInBufferedMode {
                        role: Role::Evaluator,
                    }
                    .into());
                }
                Break::Time => self.state.cursor.finish()?,
                Break::Done => {
                    self.state.cursor.finish()?;
                    break;
                }
            }
        }
        if stores.remaining() > 0 {
            return Err(ProtocolViolation::TrailingBatches(stores.remaining()).into());
        }
        self.finish(processor).await
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::{
        channel::SimpleChannel,
        codec::{send_batch, send_done},
        config::Mode,
        data_types::Delta,
        protocol::EVALUATOR,
    };

    /// Plays the garbler's side of the setup, then sends the given batches verbatim.
    async fn replay_garbler<S: Strategy>(
        channel: SimpleChannel,
        config: EngineConfig,
        batches: Vec<(GateBatch, MaskBatch)>,
    ) -> Result<(), Error> {
        let mut channel = MsgChannel(channel);
        handshake::<S>(&mut channel, EVALUATOR, &config).await?;
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let delta = Delta::random(&mut rng);
        let mut keys = WireKeySource::new(EVALUATOR, OtExtension::default());
        keys.setup(&mut channel, Some(delta), &mut rng).await?;
        for (gates, masks) in &batches {
            send_batch(&mut channel, EVALUATOR, gates, masks).await?;
        }
        send_done(&mut channel, EVALUATOR).await
    }

    fn empty_batch(seq: u64, first_gate: u64) -> (GateBatch, MaskBatch) {
        (
            GateBatch {
                seq,
                first_gate,
                gates: vec![],
                garbler_inputs: vec![],
                evaluator_inputs: 0,
            },
            MaskBatch { seq, masks: vec![] },
        )
    }

    #[tokio::test]
    async fn buffered_replay_rejects_swapped_batches() {
        let (garbler, evaluator) = SimpleChannel::pair();
        let config = EngineConfig::default().with_mode(Mode::Buffered);
        let program = Program::new(vec![], 0).unwrap();
        let batches = vec![empty_batch(1, 0), empty_batch(0, 0)];
        let (sent, evaluated) = futures::future::join(
            replay_garbler::<Buffered>(garbler, config.clone(), batches),
            async {
                Evaluator::<_, Buffered>::new(evaluator, &config)
                    .await?
                    .run(&program, &[])
                    .await
            },
        )
        .await;
        sent.unwrap();
        assert!(matches!(
            evaluated,
            Err(Error::Protocol(ProtocolViolation::OutOfOrderBatch {
                expected: 0,
                actual: 1
            }))
        ));
    }

    #[tokio::test]
    async fn continuous_evaluation_rejects_wrong_gate_index() {
        let (garbler, evaluator) = SimpleChannel::pair();
        let config = EngineConfig::default();
        let program = Program::new(vec![], 0).unwrap();
        let (sent, evaluated) = futures::future::join(
            replay_garbler::<Continuous>(garbler, config.clone(), vec![empty_batch(0, 5)]),
            async {
                Evaluator::<_, Continuous>::new(evaluator, &config)
                    .await?
                    .run(&program, &[])
                    .await
            },
        )
        .await;
        sent.unwrap();
        assert!(matches!(
            evaluated,
            Err(Error::Protocol(ProtocolViolation::UnexpectedGateIndex {
                expected: 0,
                actual: 5
            }))
        ));
    }

    #[tokio::test]
    async fn early_done_is_a_violation() {
        let (garbler, evaluator) = SimpleChannel::pair();
        let config = EngineConfig::default();
        let program = Program::new(vec![], 0).unwrap();
        let (sent, evaluated) = futures::future::join(
            replay_garbler::<Continuous>(garbler, config.clone(), vec![]),
            async {
                Evaluator::<_, Continuous>::new(evaluator, &config)
                    .await?
                    .run(&program, &[])
                    .await
            },
        )
        .await;
        sent.unwrap();
        assert!(matches!(
            evaluated,
            Err(Error::Protocol(ProtocolViolation::UnexpectedDone))
        ));
    }
}
