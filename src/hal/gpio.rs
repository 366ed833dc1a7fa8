//! GPIO backends

use super::{Gpio, Pin};
use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Linux sysfs GPIO (`/sys/class/gpio`)
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    /// Export the given pins and set their direction
    pub fn open(root: impl Into<PathBuf>, inputs: &[Pin], outputs: &[Pin]) -> Result<Self> {
        let gpio = Self { root: root.into() };

        for pin in inputs {
            gpio.configure(*pin, "in")?;
        }
        for pin in outputs {
            gpio.configure(*pin, "out")?;
        }

        Ok(gpio)
    }

    fn pin_dir(&self, pin: Pin) -> PathBuf {
        self.root.join(format!("gpio{}", pin.0))
    }

    fn configure(&self, pin: Pin, direction: &str) -> Result<()> {
        let dir = self.pin_dir(pin);
        if !dir.exists() {
            debug!("Exporting {}", pin);
            write_value(&self.root.join("export"), &pin.0.to_string())?;
        }
        write_value(&dir.join("direction"), direction)
            .with_context(|| format!("failed to set {} as {}", pin, direction))
    }
}

fn write_value(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).with_context(|| format!("failed to write {}", path.display()))
}

impl Gpio for SysfsGpio {
    fn read(&self, pin: Pin) -> Result<bool> {
        let path = self.pin_dir(pin).join("value");
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => bail!("unexpected value {:?} on {}", other, pin),
        }
    }

    fn write(&self, pin: Pin, high: bool) -> Result<()> {
        write_value(&self.pin_dir(pin).join("value"), if high { "1" } else { "0" })
    }
}

/// In-memory pin levels. Unwritten pins read high, like a pulled-up input.
#[derive(Default)]
pub struct SimulatedGpio {
    levels: Mutex<HashMap<Pin, bool>>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Gpio for SimulatedGpio {
    fn read(&self, pin: Pin) -> Result<bool> {
        let levels = self
            .levels
            .lock()
            .map_err(|_| anyhow!("gpio state poisoned"))?;
        Ok(levels.get(&pin).copied().unwrap_or(true))
    }

    fn write(&self, pin: Pin, high: bool) -> Result<()> {
        self.levels
            .lock()
            .map_err(|_| anyhow!("gpio state poisoned"))?
            .insert(pin, high);
        Ok(())
    }
}
