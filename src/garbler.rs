//! The garbler role (party 0).

use std::{collections::VecDeque, marker::PhantomData};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{Level, debug, instrument};

use crate::{
    channel::{Channel, MsgChannel},
    codec::{BatchBuilder, send_batch, send_done},
    config::{ConfigError, EngineConfig, Role},
    data_types::{Delta, Label, OutputMask},
    garble::{garble_and, garble_not},
    interpreter::{Backend, Break, InterpreterError, Memory, Processor, Program},
    keys::WireKeySource,
    mode::{Buffered, Continuous, Strategy, handshake},
    ot::OtExtension,
    protocol::{EVALUATOR, Error, Outputs},
};

/// Produces the garbled gates of a program and streams them to the evaluator.
pub struct Garbler<C: Channel, S: Strategy = Continuous> {
    channel: MsgChannel<C>,
    keys: WireKeySource,
    state: GarblerState,
    seq: u64,
    time_slice: usize,
    _strategy: PhantomData<S>,
}

struct GarblerState {
    delta: Delta,
    rng: ChaCha20Rng,
    inputs: VecDeque<bool>,
    builder: BatchBuilder,
    gate_counter: u64,
}

/// The garbler's [`Backend`] for the duration of one slice.
struct GarbleSlice<'a> {
    keys: &'a WireKeySource,
    state: &'a mut GarblerState,
}

impl Backend for GarbleSlice<'_> {
    fn input_garbler(&mut self) -> Result<Label, Error> {
        let bit = self
            .state
            .inputs
            .pop_front()
            .ok_or(InterpreterError::MissingGarblerInput)?;
        let (zero, one) = self.keys.derive(&mut self.state.rng)?;
        self.state
            .builder
            .push_garbler_input(if bit { one } else { zero });
        Ok(zero)
    }

    fn input_evaluator(&mut self) -> Result<Label, Error> {
        let (zero, _) = self.keys.derive(&mut self.state.rng)?;
        self.state.builder.push_evaluator_input(zero);
        Ok(zero)
    }

    fn and(&mut self, lhs: Label, rhs: Label) -> Result<Label, Error> {
        let (gate, zero) = garble_and(lhs, rhs, self.state.delta, self.state.gate_counter);
        self.state.gate_counter += 1;
        self.state.builder.push_gate(gate);
        Ok(zero)
    }

    fn not(&mut self, src: Label) -> Label {
        garble_not(src, self.state.delta)
    }

    fn reveal(&mut self, wires: &[Label]) -> Result<Option<u64>, Error> {
        for zero in wires {
            self.state.builder.push_mask(OutputMask(zero.color()));
        }
        Ok(None)
    }

    fn private_output(&mut self, wires: &[Label]) -> Result<(), Error> {
        self.reveal(wires).map(|_| ())
    }
}

impl<C: Channel, S: Strategy> Garbler<C, S> {
    /// Agrees on the configuration with the evaluator, samples Δ and sets up the OT extension.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn new(channel: C, config: &EngineConfig) -> Result<Self, Error> {
        let mut channel = MsgChannel(channel);
        handshake::<S>(&mut channel, EVALUATOR, config).await?;
        let mut rng = ChaCha20Rng::from_os_rng();
        let delta = Delta::random(&mut rng);
        let mut keys = WireKeySource::new(EVALUATOR, OtExtension::default());
        keys.setup(&mut channel, Some(delta), &mut rng).await?;
        Ok(Self {
            channel,
            keys,
            state: GarblerState {
                delta,
                rng,
                inputs: VecDeque::new(),
                builder: BatchBuilder::default(),
                gate_counter: 0,
            },
            seq: 0,
            time_slice: config.time_slice,
            _strategy: PhantomData,
        })
    }

    fn execute_slice(
        &mut self,
        program: &Program,
        processor: &mut Processor,
        memory: &mut Memory,
    ) -> Result<Break, Error> {
        let mut slice = GarbleSlice {
            keys: &self.keys,
            state: &mut self.state,
        };
        program.execute(processor, memory, &mut slice, self.time_slice)
    }

    /// Sends the batch of the finished slice and queues its evaluator inputs for OT.
    async fn send_slice(&mut self) -> Result<(), Error> {
        let (gates, masks, zero_labels) = self.state.builder.take(self.seq, self.state.gate_counter);
        self.seq += 1;
        send_batch(&mut self.channel, EVALUATOR, &gates, &masks).await?;
        self.keys.obliviously_transfer(zero_labels);
        Ok(())
    }

    async fn recv_openings(&mut self, processor: &mut Processor) -> Result<(), Error> {
        let openings: Vec<u64> = self.channel.recv_from(EVALUATOR, "openings").await?;
        processor.apply_openings(openings)
    }
}

impl<C: Channel> Garbler<C, Continuous> {
    /// Garbles the program slice by slice, sending each batch as soon as the slice ends.
    ///
    /// A slice that ends with a restart request is sent as well; the garbler then waits for the
    /// evaluator to open the pending revealed values and re-executes the tainted instruction.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn run(mut self, program: &Program, inputs: &[bool]) -> Result<Outputs, Error> {
        self.state.inputs = inputs.iter().copied().collect();
        let mut processor = program.processor();
        let mut memory = program.memory();
        loop {
            let brk = self.execute_slice(program, &mut processor, &mut memory)?;
            self.send_slice().await?;
            self.keys.process_receiver_inputs(&mut self.channel).await?;
            match brk {
                Break::Restart => {
                    processor.rewind();
                    debug!(
                        pc = processor.pc(),
                        pending = processor.pending_openings(),
                        "restarting after pending openings"
                    );
                    self.recv_openings(&mut processor).await?;
                }
                Break::Time => {}
                Break::Done => break,
            }
        }
        send_done(&mut self.channel, EVALUATOR).await?;
        self.recv_openings(&mut processor).await?;
        debug!(batches = self.seq, gates = self.state.gate_counter, "garbling done");
        Ok(Outputs {
            revealed: processor.revealed_values(),
            private: vec![],
        })
    }
}

impl<C: Channel> Garbler<C, Buffered> {
    /// Garbles the whole program before serving any evaluator input.
    ///
    /// Fails with [`ConfigError::RestartInBufferedMode`] if the program depends on a revealed
    /// value.
    #[instrument(level = Level::DEBUG, skip_all, err)]
    pub async fn run(mut self, program: &Program, inputs: &[bool]) -> Result<Outputs, Error> {
        self.state.inputs = inputs.iter().copied().collect();
        let mut processor = program.processor();
        let mut memory = program.memory();
        loop {
            match self.execute_slice(program, &mut processor, &mut memory)? {
                Break::Restart => {
                    return Err(ConfigError::RestartInBufferedMode {
                        role: Role::Garbler,
                    }
                    .into());
                }
                Break::Time => self.send_slice().await?,
                Break::Done => {
                    self.send_slice().await?;
                    break;
                }
            }
        }
        send_done(&mut self.channel, EVALUATOR).await?;
        debug!(
            transfers = self.keys.pending_transfers(),
            "serving evaluator inputs"
        );
        self.keys.process_receiver_inputs(&mut self.channel).await?;
        self.recv_openings(&mut processor).await?;
        debug!(batches = self.seq, gates = self.state.gate_counter, "garbling done");
        Ok(Outputs {
            revealed: processor.revealed_values(),
            private: vec![],
        })
    }
}
