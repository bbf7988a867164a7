use anyhow::{Context, Result};

use crate::port::describe;

pub fn run() -> Result<()> {
    let ports = serialport::available_ports().context("enumerate serial ports")?;
    if ports.is_empty() {
        eprintln!("[ports] none found");
    }
    for p in &ports {
        println!("{}", describe(p));
    }
    Ok(())
}
