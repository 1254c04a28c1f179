use std::sync::mpsc::Sender;

use color_eyre::eyre::{self, WrapErr};

use crate::worker::WorkerCommand;

/// Maps one line of operator input to a worker command. Returns `true` when
/// the operator asked to quit.
pub fn handle_line(
    line: &str,
    read_only: bool,
    command_tx: &Sender<WorkerCommand>,
) -> eyre::Result<bool> {
    let command = match line.trim() {
        "q" | "quit" | "exit" => {
            command_tx
                .send(WorkerCommand::Terminate)
                .wrap_err("send terminate")?;
            return Ok(true);
        }
        "r" | "reset" => WorkerCommand::ResetVolume,
        "z" | "zero" => WorkerCommand::ZeroCalibration,
        _ => return Ok(false),
    };

    if !read_only {
        command_tx.send(command).wrap_err("send command")?;
    }
    Ok(false)
}
