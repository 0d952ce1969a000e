//! Runs every analysis over the entry points of a game.

use crate::analysis::{
    combine, find_entry_points, leads_to_input, slice_entry_point, InputAnalysis, Slice,
};
use crate::compile::{compile_path, AccessorRegistry, CompiledPath};
use crate::config::GameConfiguration;
use crate::il;
use crate::model::{halted, AnalysisReport, EntryPointReport, PathRecord, SkippedEntryPoint};
use crate::symbolic::{ExecutionStatus, InputConfiguration, Solver, SymexMachine, Z3Process};
use crate::Error;
use crate::RC;

/// The result of one entry point.
#[derive(Clone, Debug)]
pub struct EntryPointAnalysis {
    pub report: EntryPointReport,
    /// The compiled halted paths, in path index order.
    pub paths: Vec<CompiledPath>,
}

pub struct Driver<'d> {
    program: &'d il::Program,
    game_config: &'d GameConfiguration,
    solver: &'d dyn Solver,
    registry: AccessorRegistry,
}

impl<'d> Driver<'d> {
    pub fn new(
        program: &'d il::Program,
        game_config: &'d GameConfiguration,
        solver: &'d dyn Solver,
    ) -> Driver<'d> {
        Driver {
            program,
            game_config,
            solver,
            registry: AccessorRegistry::new(),
        }
    }

    /// Accessors used to compile path conditions. Without them every
    /// non-input variable is reported as unresolved.
    pub fn with_registry(mut self, registry: AccessorRegistry) -> Driver<'d> {
        self.registry = registry;
        self
    }

    /// Analyze every entry point of `program`.
    pub fn run(
        program: &il::Program,
        game_config: &GameConfiguration,
        solver: &dyn Solver,
    ) -> Result<AnalysisReport, Error> {
        Driver::new(program, game_config, solver).analyze()
    }

    /// Analyze every entry point of `program` with `z3`, each query bounded
    /// by the configured solver timeout.
    pub fn run_with_z3(
        program: &il::Program,
        game_config: &GameConfiguration,
    ) -> Result<AnalysisReport, Error> {
        let solver = Z3Process::from_options(&game_config.analysis);
        Driver::run(program, game_config, &solver)
    }

    pub fn analyze(&self) -> Result<AnalysisReport, Error> {
        let input_api = self.game_config.input_api();
        let entry_points = find_entry_points(self.program, self.game_config, input_api);
        info!("analyzing {} entry points", entry_points.len());

        let mut report = AnalysisReport::default();
        for entry in &entry_points {
            match self.analyze_entry_point(entry) {
                Ok(analysis) => report.entry_points.push(analysis.report),
                Err(error) => {
                    if error.is_recoverable() {
                        warn!("skipping {}: {}", entry.signature(), error);
                    } else {
                        error!("skipping {}: {}", entry.signature(), error);
                    }
                    report.skipped.push(SkippedEntryPoint {
                        method: entry.signature(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        if self.game_config.slicing {
            report.slice = Some(self.slice(&entry_points, &mut report.warnings));
        }
        Ok(report)
    }

    pub fn analyze_entry_point(&self, entry: &RC<il::Method>) -> Result<EntryPointAnalysis, Error> {
        let options = &self.game_config.analysis;
        let input_api = &options.input_api;
        let signature = entry.signature();
        debug!("entry point {}", signature);

        let input = InputAnalysis::new(self.program, entry, input_api).analyze()?;
        let leads_to = leads_to_input(self.program, entry, input_api, &input)?;

        let configuration = InputConfiguration::new(&leads_to);
        let mut machine = SymexMachine::new(
            self.program,
            entry.clone(),
            options,
            self.solver,
            &configuration,
        )?;
        machine.run()?;
        let mut states = machine.into_states();
        debug!(
            "{}: {} states, {} halted",
            signature,
            states.len(),
            halted(&states)
        );

        let mut report = EntryPointReport {
            method: signature.clone(),
            ..EntryPointReport::default()
        };
        let mut paths = Vec::new();
        for state in states.iter_mut() {
            match state.status() {
                ExecutionStatus::Halted => {}
                ExecutionStatus::Aborted => {
                    report.aborted += 1;
                    continue;
                }
                ExecutionStatus::Running => {
                    return Err(Error::Custom(format!(
                        "a state of {} is still running",
                        signature
                    )))
                }
            }
            let path_index = paths.len() + 1;
            state.data_mut().path_id = Some(path_index);

            let compiled = compile_path(
                state.path_condition(),
                state.symbolic_method_calls(),
                &self.registry,
                input_api,
            )?;
            report
                .warnings
                .extend(compiled.warnings().iter().map(|warning| {
                    format!("path {}: {}", path_index, warning)
                }));
            report
                .paths
                .push(PathRecord::from_state(&signature, path_index, state).with_compiled(&compiled));
            paths.push(compiled);
        }
        info!("{}: {} paths", signature, paths.len());

        Ok(EntryPointAnalysis { report, paths })
    }

    /// The input slice over every entry point. Entry points whose slice
    /// fails are left out with a warning.
    fn slice(&self, entry_points: &[RC<il::Method>], warnings: &mut Vec<String>) -> Slice {
        let input_api = self.game_config.input_api();
        let mut slices = Vec::new();
        for entry in entry_points {
            match slice_entry_point(self.program, entry, input_api) {
                Ok(slice) => slices.push(slice),
                Err(error) => {
                    let warning = format!("no slice for {}: {}", entry.signature(), error);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
        combine(slices)
    }
}
