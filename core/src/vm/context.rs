use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::universe::{ClassTable, DefaultHook, ErrorHook, GlobalTable};
use crate::util::sync;

use super::config::VmConfig;

/// Where `System>>printString:` and friends write.
#[derive(Debug, Clone, Default)]
pub enum Output {
    #[default]
    Stdout,
    Buffer(Arc<Mutex<String>>),
}

impl Output {
    pub fn buffer() -> Self {
        Output::Buffer(Arc::new(Mutex::new(String::new())))
    }

    pub fn write_str(&self, s: &str) {
        match self {
            Output::Stdout => {
                if let Err(e) = emit(&mut std::io::stdout().lock(), s) {
                    tracing::warn!(target: "sprig::vm", error = %e, "failed to write program output");
                }
            }
            Output::Buffer(buf) => sync::lock(buf).push_str(s),
        }
    }

    /// Captured text, for buffer outputs.
    pub fn contents(&self) -> Option<String> {
        match self {
            Output::Stdout => None,
            Output::Buffer(buf) => Some(sync::lock(buf).clone()),
        }
    }
}

fn emit(out: &mut impl Write, s: &str) -> std::io::Result<()> {
    out.write_all(s.as_bytes())?;
    out.flush()
}

/// Everything a VM shares with the outside world: the class table, the
/// global bindings, the error-reporting hook and the output sink.
#[derive(Clone)]
pub struct VmContext {
    classes: Arc<ClassTable>,
    globals: Arc<GlobalTable>,
    hook: Arc<dyn ErrorHook>,
    output: Output,
    config: VmConfig,
}

impl Default for VmContext {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl VmContext {
    pub fn new(config: VmConfig) -> Self {
        Self {
            classes: Arc::new(ClassTable::new()),
            globals: Arc::new(GlobalTable::new()),
            hook: Arc::new(DefaultHook),
            output: Output::default(),
            config,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ErrorHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    #[inline]
    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    #[inline]
    pub fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    pub fn hook(&self) -> &Arc<dyn ErrorHook> {
        &self.hook
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }
}
