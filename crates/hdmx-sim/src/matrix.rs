//! Virtual matrix simulation
//!
//! Provides an in-memory crosspoint matrix that reacts to wire commands the
//! way a real unit does: set commands change state and echo it back, queries
//! print free-form status lines.

use std::collections::HashMap;

use hdmx_protocol::MatrixCommand;
use serde::{Deserialize, Serialize};

/// A simulated HDMI matrix
#[derive(Debug, Clone)]
pub struct VirtualMatrix {
    /// Model name printed in reply to `r type!`
    model: String,
    /// Number of inputs
    inputs: u32,
    /// Number of outputs
    outputs: u32,
    /// Input shown on each output (index 0 is output 1)
    routes: Vec<u32>,
    /// Power state
    powered: bool,
    /// Accept connections but never answer
    silent: bool,
    /// Extra lines printed before every routing table
    noise: Vec<String>,
    /// Canned replies that replace the simulated one
    overrides: HashMap<MatrixCommand, String>,
}

/// Configuration for creating a virtual matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMatrixConfig {
    /// Model name
    pub model: String,
    /// Number of inputs
    pub inputs: u32,
    /// Number of outputs
    pub outputs: u32,
    /// Initial power state
    pub powered: bool,
}

impl Default for VirtualMatrixConfig {
    fn default() -> Self {
        Self {
            model: "Virtual Matrix".to_string(),
            inputs: 8,
            outputs: 8,
            powered: true,
        }
    }
}

impl VirtualMatrix {
    /// Create a powered-on matrix with output N showing input N (or input 1
    /// when there are more outputs than inputs)
    pub fn new(model: impl Into<String>, inputs: u32, outputs: u32) -> Self {
        let inputs = inputs.max(1);
        let routes = (1..=outputs)
            .map(|o| if o <= inputs { o } else { 1 })
            .collect();
        Self {
            model: model.into(),
            inputs,
            outputs,
            routes,
            powered: true,
            silent: false,
            noise: Vec::new(),
            overrides: HashMap::new(),
        }
    }

    /// Create a virtual matrix from configuration
    pub fn from_config(config: VirtualMatrixConfig) -> Self {
        let mut matrix = Self::new(config.model, config.inputs, config.outputs);
        matrix.powered = config.powered;
        matrix
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of inputs
    pub fn inputs(&self) -> u32 {
        self.inputs
    }

    /// Number of outputs
    pub fn outputs(&self) -> u32 {
        self.outputs
    }

    /// Input currently shown on `output`
    pub fn route(&self, output: u32) -> Option<u32> {
        let index = usize::try_from(output.checked_sub(1)?).ok()?;
        self.routes.get(index).copied()
    }

    /// Change a route out-of-band, as if someone pressed the front panel
    pub fn set_route(&mut self, input: u32, output: u32) -> bool {
        if !(1..=self.inputs).contains(&input) {
            return false;
        }
        match output {
            0 => {
                self.routes.iter_mut().for_each(|r| *r = input);
                true
            }
            o if o <= self.outputs => {
                self.routes[(o - 1) as usize] = input;
                true
            }
            _ => false,
        }
    }

    /// Power state
    pub fn powered(&self) -> bool {
        self.powered
    }

    /// Change power out-of-band
    pub fn set_powered(&mut self, powered: bool) {
        self.powered = powered;
    }

    /// Whether the matrix swallows commands without answering
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Make the matrix swallow commands without answering
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Add a line printed ahead of every routing table
    pub fn add_noise_line(&mut self, line: impl Into<String>) {
        self.noise.push(line.into());
    }

    /// Reply to `command` with `reply` verbatim instead of simulating it
    ///
    /// Set commands answered by an override do not change state.
    pub fn set_reply_override(&mut self, command: MatrixCommand, reply: impl Into<String>) {
        self.overrides.insert(command, reply.into());
    }

    /// Remove all reply overrides
    pub fn clear_reply_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Apply a command and produce the reply text
    pub fn handle(&mut self, command: &MatrixCommand) -> String {
        if let Some(reply) = self.overrides.get(command) {
            return reply.clone();
        }

        match *command {
            MatrixCommand::QueryModel => format!("{}\r\n", self.model),
            MatrixCommand::QueryRouting => {
                let mut reply: String = self.noise.iter().map(|l| format!("{}\r\n", l)).collect();
                for (index, input) in self.routes.iter().enumerate() {
                    reply.push_str(&route_line(*input, index as u32 + 1));
                }
                reply
            }
            MatrixCommand::QueryOutput { output } => match self.route(output) {
                Some(input) => route_line(input, output),
                None => "command error\r\n".to_string(),
            },
            MatrixCommand::Route { input, output } => {
                if self.set_route(input, output) {
                    route_line(input, output)
                } else {
                    "command error\r\n".to_string()
                }
            }
            MatrixCommand::SetPower { on } => {
                self.powered = on;
                power_line(on)
            }
            MatrixCommand::QueryPower => power_line(self.powered),
        }
    }
}

fn route_line(input: u32, output: u32) -> String {
    format!("input {} -> output {}\r\n", input, output)
}

fn power_line(on: bool) -> String {
    if on {
        "power on\r\n".to_string()
    } else {
        "power off\r\n".to_string()
    }
}
