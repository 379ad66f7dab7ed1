//! Problem library: built-in problems, TOML bank additions, and the per-difficulty
//! fallbacks served when generation fails.

use std::collections::HashMap;

use tracing::{error, info};

use crate::config::ProblemCfg;
use crate::domain::{Difficulty, Problem, ProblemOrigin};
use crate::store::validate_key;

/// Fixed, ordered problem library known at startup.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
  problems: Vec<Problem>,
  origin: HashMap<String, ProblemOrigin>,
}

impl Catalog {
  /// Built-ins first, then bank entries in file order. Bank entries never override a built-in id.
  pub fn new(bank: &[ProblemCfg]) -> Self {
    let mut cat = Catalog::default();
    for p in builtin_problems() {
      cat.push(p, ProblemOrigin::Catalog);
    }

    for cfg in bank {
      if cfg.description.trim().is_empty() || cfg.initial_code.trim().is_empty() {
        error!(target: "problem", id = %cfg.id, "Skipping bank problem: missing description or initial code.");
        continue;
      }
      if let Err(e) = validate_key(&cfg.id) {
        error!(target: "problem", id = %cfg.id, error = %e, "Skipping bank problem: id cannot be used as a progress key.");
        continue;
      }
      if cat.origin.contains_key(&cfg.id) {
        error!(target: "problem", id = %cfg.id, "Skipping bank problem: id already in library.");
        continue;
      }
      cat.push(
        Problem {
          id: cfg.id.clone(),
          title: cfg.title.clone(),
          difficulty: cfg.difficulty,
          description: cfg.description.clone(),
          initial_code: cfg.initial_code.clone(),
        },
        ProblemOrigin::Bank,
      );
    }

    for d in Difficulty::ALL {
      let n = cat.problems.iter().filter(|p| p.difficulty == d).count();
      info!(target: "problem", difficulty = %d, count = n, "Startup library inventory");
    }
    cat
  }

  fn push(&mut self, p: Problem, origin: ProblemOrigin) {
    self.origin.insert(p.id.clone(), origin);
    self.problems.push(p);
  }

  pub fn all(&self) -> &[Problem] { &self.problems }

  pub fn get(&self, id: &str) -> Option<&Problem> {
    self.problems.iter().find(|p| p.id == id)
  }

  pub fn origin_of(&self, id: &str) -> Option<ProblemOrigin> { self.origin.get(id).copied() }

  /// Case-insensitive match on title or difficulty; empty query returns everything.
  pub fn search(&self, query: &str) -> Vec<Problem> {
    filter_problems(&self.problems, query, true)
  }
}

/// Shared filter for the library and the generated history.
/// History entries are only matched by title.
pub fn filter_problems(problems: &[Problem], query: &str, match_difficulty: bool) -> Vec<Problem> {
  let q = query.trim().to_lowercase();
  if q.is_empty() {
    return problems.to_vec();
  }
  problems
    .iter()
    .filter(|p| {
      p.title.to_lowercase().contains(&q)
        || (match_difficulty && p.difficulty.as_str().to_lowercase().contains(&q))
    })
    .cloned()
    .collect()
}

/// First tutor message of a fresh session on a problem.
pub fn greeting(problem: &Problem) -> String {
  format!(
    "Hi! I'm ready to help you with \"{}\".\n\nAsk me for a hint if you get stuck!",
    problem.title
  )
}

/// Deterministic replacement when the generator is unavailable. The caller assigns the id.
pub fn fallback_problem(difficulty: Difficulty) -> Problem {
  let (title, description, initial_code) = match difficulty {
    Difficulty::Easy => (
      "D Flip-Flop with Reset",
      "Create a D flip-flop with synchronous active-high reset.\n\n**Ports:**\n* `clk`: Clock input\n* `reset`: Synchronous reset\n* `d`: Data input\n* `q`: Output",
      "module d_ff (\n    input clk,\n    input reset,\n    input d,\n    output reg q\n);\n\n    always @(posedge clk) begin\n        // Your logic here\n    end\n\nendmodule",
    ),
    Difficulty::Medium => (
      "Falling Edge Detector",
      "Design a circuit that pulses `tick` high for exactly one clock cycle when `in` goes from 1 to 0.\n\n**Ports:**\n* `clk`: Clock\n* `rst`: Synchronous reset\n* `in`: Input signal\n* `tick`: Output pulse",
      "module fall_detect (\n    input clk,\n    input rst,\n    input in,\n    output reg tick\n);\n    // Your logic here\nendmodule",
    ),
    Difficulty::Hard => (
      "Gray Code Counter",
      "Design a 4-bit counter whose output advances through the Gray code sequence on every rising clock edge. Reset is asynchronous and active low.\n\n**Ports:**\n* `clk`: Clock\n* `rst_n`: Asynchronous reset (active low)\n* `gray`: 4-bit Gray code output",
      "module gray_counter (\n    input clk,\n    input rst_n,\n    output reg [3:0] gray\n);\n    // Hint: keep a binary counter and convert\nendmodule",
    ),
  };
  Problem {
    id: String::new(),
    title: title.into(),
    difficulty,
    description: description.into(),
    initial_code: initial_code.into(),
  }
}

fn p(id: &str, title: &str, difficulty: Difficulty, description: &str, initial_code: &str) -> Problem {
  Problem {
    id: id.into(),
    title: title.into(),
    difficulty,
    description: description.into(),
    initial_code: initial_code.into(),
  }
}

/// Built-in library, in display order.
pub fn builtin_problems() -> Vec<Problem> {
  use Difficulty::*;
  vec![
    p(
      "static-mux2",
      "2-to-1 Multiplexer",
      Easy,
      "Implement a 1-bit 2-to-1 multiplexer using ternary operators or if-else statements.\n\n**Ports:**\n* `a`: Input 0 (1-bit)\n* `b`: Input 1 (1-bit)\n* `sel`: Select signal (1-bit)\n* `out`: Output (1-bit)\n\n**Behavior:**\nIf `sel` is 0, `out` = `a`.\nIf `sel` is 1, `out` = `b`.",
      "module mux2to1 (\n    input a,\n    input b,\n    input sel,\n    output out\n);\n    // Write your code here\n\nendmodule",
    ),
    p(
      "static-dff",
      "D Flip-Flop (Sync Reset)",
      Easy,
      "Create a positive edge-triggered D flip-flop with a synchronous active-high reset.\n\n**Ports:**\n* `clk`: Clock input\n* `reset`: Synchronous reset (active high)\n* `d`: Data input\n* `q`: Output",
      "module d_ff_sync (\n    input clk,\n    input reset,\n    input d,\n    output reg q\n);\n    always @(posedge clk) begin\n        // Write your code here\n    end\nendmodule",
    ),
    p(
      "static-counter",
      "4-bit Binary Counter",
      Easy,
      "Design a 4-bit synchronous up-counter with an active-high synchronous reset. It should wrap around from 15 to 0.\n\n**Ports:**\n* `clk`: Clock\n* `reset`: Synchronous Reset\n* `q`: 4-bit Output",
      "module counter_4bit (\n    input clk,\n    input reset,\n    output reg [3:0] q\n);\n    // Write your code here\nendmodule",
    ),
    p(
      "static-edgedetect",
      "Rising Edge Detector",
      Medium,
      "Design a circuit that detects a rising edge on the input signal `in`. The output `tick` should be high for exactly one clock cycle when a 0->1 transition occurs on `in`.\n\n**Ports:**\n* `clk`: Clock\n* `in`: Input signal\n* `tick`: Output pulse",
      "module edge_detector (\n    input clk,\n    input in,\n    output reg tick\n);\n    // Hint: You might need a register to store the previous state of \"in\"\n\nendmodule",
    ),
    p(
      "static-shiftreg",
      "Universal Shift Register",
      Medium,
      "Implement a 4-bit universal shift register with the following modes controlled by `ctrl`:\n\n* `00`: Hold value\n* `01`: Shift Right\n* `10`: Shift Left\n* `11`: Parallel Load\n\n**Ports:**\n* `clk`, `rst`: Clock and Reset\n* `ctrl`: 2-bit Control\n* `d`: 4-bit Parallel Input\n* `q`: 4-bit Output",
      "module shift_reg (\n    input clk,\n    input rst,\n    input [1:0] ctrl,\n    input [3:0] d,\n    output reg [3:0] q\n);\n    // Write logic here\nendmodule",
    ),
    p(
      "static-fsm1011",
      "Sequence Detector (1011)",
      Medium,
      "Design a Moore FSM to detect the overlapping sequence \"1011\".\n\n**Example:**\nInput:  0 1 0 1 1 0 1 1\nOutput: 0 0 0 0 1 0 0 1\n\n**Ports:**\n* `clk`: Clock\n* `reset`: Asynchronous Reset (active high)\n* `in`: Serial input\n* `detected`: Output signal (high when 1011 is detected)",
      "module seq_detect_1011 (\n    input clk,\n    input reset,\n    input in,\n    output reg detected\n);\n    // State encoding\n    localparam S0 = 0, S1 = 1, S10 = 2, S101 = 3, S1011 = 4;\n    reg [2:0] state, next_state;\n\n    // State transition logic\nendmodule",
    ),
    p(
      "static-priority",
      "4-to-2 Priority Encoder",
      Medium,
      "Design a 4-to-2 priority encoder. If multiple inputs are high, the highest index has priority.\n\n* `in[3]` -> `out` = 3\n* `in[2]` -> `out` = 2\n* `in[1]` -> `out` = 1\n* `in[0]` -> `out` = 0\n* `in` = 0 -> `out` = 0, `valid` = 0\n\n**Ports:**\n* `in`: 4-bit Input\n* `out`: 2-bit Output\n* `valid`: Output valid flag",
      "module priority_enc (\n    input [3:0] in,\n    output reg [1:0] out,\n    output reg valid\n);\n    always @(*) begin\n        // Combinational logic here\n    end\nendmodule",
    ),
    p(
      "static-clkdiv3",
      "Clock Divider by 3",
      Hard,
      "Design a clock divider that divides the input clock frequency by 3 with a 50% duty cycle output.\n\n**Ports:**\n* `clk_in`: Input Clock\n* `rst`: Reset\n* `clk_out`: Output Clock (freq = clk_in / 3)",
      "module clk_div3 (\n    input clk_in,\n    input rst,\n    output clk_out\n);\n    // Hint: You may need two counters triggered on opposite edges\nendmodule",
    ),
    p(
      "static-fifo",
      "Synchronous FIFO",
      Hard,
      "Implement a synchronous FIFO (First-In-First-Out) with parameterized depth and width. Ensure full and empty flags are handled correctly.\n\n**Parameters:**\n* `DEPTH`: 16\n* `WIDTH`: 8\n\n**Ports:**\n* `clk`, `rst_n`: Clock and Active Low Reset\n* `wr_en`, `rd_en`: Write and Read Enables\n* `data_in`: Input Data\n* `data_out`: Output Data\n* `full`, `empty`: Status flags",
      "module sync_fifo #(\n    parameter DEPTH = 16,\n    parameter WIDTH = 8\n)(\n    input clk,\n    input rst_n,\n    input wr_en,\n    input rd_en,\n    input [WIDTH-1:0] data_in,\n    output reg [WIDTH-1:0] data_out,\n    output wire full,\n    output wire empty\n);\n    // Internal memory declaration\n    // reg [WIDTH-1:0] mem [0:DEPTH-1];\n    \n    // Pointers logic\nendmodule",
    ),
    p(
      "static-arbiter",
      "Round Robin Arbiter",
      Hard,
      "Design a 4-agent Round Robin Arbiter. It grants access to one requestor at a time in a circular order.\n\n**Ports:**\n* `clk`, `rst`: Clock and Reset\n* `req`: 4-bit Request vector\n* `grant`: 4-bit Grant vector (one-hot)",
      "module arbiter_rr (\n    input clk,\n    input rst,\n    input [3:0] req,\n    output reg [3:0] grant\n);\n    // Write your arbiter logic\nendmodule",
    ),
  ]
}
