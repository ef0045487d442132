//! In-memory node used by this crate's unit tests.

use std::cell::RefCell;
use std::collections::BTreeMap;

use sandnet_common::error::Result;
use sandnet_core::filesystem::mount::MountTable;
use sandnet_core::helper::ExecOutput;
use sandnet_core::namespace::NamespaceSet;
use sandnet_core::sandbox::Sandboxable;

/// Records every command instead of running it.
pub struct FakeNode {
    pub name: String,
    pub namespaces: NamespaceSet,
    pub private_logs: bool,
    pub private_run: bool,
    pub mounts: MountTable,
    pub commands: RefCell<Vec<String>>,
    failures: BTreeMap<String, (i32, String)>,
}

impl FakeNode {
    pub fn new(name: &str, namespaces: NamespaceSet) -> Self {
        Self {
            name: name.to_owned(),
            namespaces,
            private_logs: true,
            private_run: true,
            mounts: MountTable::default(),
            commands: RefCell::new(Vec::new()),
            failures: BTreeMap::new(),
        }
    }

    /// Makes `command` exit with `code` and `stderr`.
    pub fn fail_with(&mut self, command: &str, code: i32, stderr: &str) {
        let _ = self
            .failures
            .insert(command.to_owned(), (code, stderr.to_owned()));
    }

    /// Command lines passed to [`Sandboxable::run`], in order.
    pub fn ran(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .filter(|c| !c.starts_with("mount "))
            .cloned()
            .collect()
    }

    fn record(&self, command: String) -> ExecOutput {
        let out = match self.failures.get(&command) {
            Some((code, stderr)) => ExecOutput {
                exit_code: *code,
                stderr: stderr.clone(),
                ..ExecOutput::default()
            },
            None => ExecOutput::default(),
        };
        self.commands.borrow_mut().push(command);
        out
    }
}

impl Sandboxable for FakeNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespaces(&self) -> &NamespaceSet {
        &self.namespaces
    }

    fn has_private_logs(&self) -> bool {
        self.private_logs
    }

    fn has_private_run(&self) -> bool {
        self.private_run
    }

    fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    fn mounts_mut(&mut self) -> &mut MountTable {
        &mut self.mounts
    }

    fn exec(&self, argv: &[String]) -> Result<ExecOutput> {
        Ok(self.record(argv.join(" ")))
    }

    fn run(&self, command: &str) -> Result<ExecOutput> {
        Ok(self.record(command.to_owned()))
    }
}
