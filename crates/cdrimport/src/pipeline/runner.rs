use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info_span};

use crate::error::{ParseError, ReadError};
use crate::events::{EventSink, ImportEvent};
use crate::storage::{OutputWriter, WrittenFiles};
use crate::worker::job::UnitResult;

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, Stage};

/// Runs read, parse and write for one work unit. One instance is shared by
/// every worker of a run so the writer's archive locks are shared too.
pub struct Pipeline {
    writer: OutputWriter,
}

impl Pipeline {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            writer: OutputWriter::new(config.separator.clone(), config.output_encoding),
        }
    }

    pub fn new(writer: OutputWriter) -> Self {
        Self { writer }
    }

    pub fn writer(&self) -> &OutputWriter {
        &self.writer
    }

    /// Run the full pipeline for a single unit.
    ///
    /// Every outcome is reported to `sink` exactly once: `UnitCompleted` on
    /// success, `UnitFailed` with the failing stage otherwise. A panic inside
    /// a stage is reported as a failure of that stage.
    pub fn run(
        &self,
        mut ctx: PipelineContext,
        sink: &dyn EventSink,
    ) -> (UnitResult, PipelineContext) {
        let filename = ctx.unit.file_name();
        let _pipeline_span = info_span!("pipeline",
            unit_id = %ctx.unit.id,
            filename = %filename,
            source = %ctx.unit.source.name,
        )
        .entered();

        sink.report(ImportEvent::UnitStarted {
            unit_id: ctx.unit.id.clone(),
            source: ctx.unit.source.name.clone(),
            file: filename.clone(),
        });

        let stage = Cell::new(Stage::Read);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_stages(&mut ctx, sink, &stage)
        }))
        .unwrap_or_else(|payload| {
            Err(PipelineError::Panicked {
                stage: stage.get(),
                message: panic_message(payload.as_ref()),
            })
        });

        match outcome {
            Ok(written) => {
                sink.report(ImportEvent::UnitCompleted {
                    unit_id: ctx.unit.id.clone(),
                    source: ctx.unit.source.name.clone(),
                    file: filename,
                    rows: ctx.rows.len(),
                    output_path: written.output_path.clone(),
                    archive_path: written.archive_path.clone(),
                });
                let result = UnitResult::completed(&ctx.unit, ctx.rows.len(), written);
                (result, ctx)
            }
            Err(error) => self.fail(ctx, filename, error, sink),
        }
    }

    fn run_stages(
        &self,
        ctx: &mut PipelineContext,
        sink: &dyn EventSink,
        stage: &Cell<Stage>,
    ) -> Result<WrittenFiles, PipelineError> {
        // Step 1: Read
        {
            stage.set(Stage::Read);
            let _step = info_span!("read").entered();
            self.step_read(ctx)?;
        }

        // Step 2: Parse
        {
            stage.set(Stage::Parse);
            let _step = info_span!("parse").entered();
            self.step_parse(ctx, sink)?;
        }

        // Step 3: Write output, then archive the input
        {
            stage.set(Stage::Write);
            let _step = info_span!("write").entered();
            self.step_write(ctx)
        }
    }

    fn step_read(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let source = &ctx.unit.source;
        let lines = source
            .reader
            .read(&ctx.unit.input_path, source.encoding)?;

        if lines.is_empty() {
            return Err(ReadError::Empty(ctx.unit.input_path.clone()).into());
        }

        debug!("Read {} lines", lines.len());
        ctx.lines = lines;
        Ok(())
    }

    fn step_parse(
        &self,
        ctx: &mut PipelineContext,
        sink: &dyn EventSink,
    ) -> Result<(), PipelineError> {
        let parser = &ctx.unit.source.parser;
        let rows = parser.parse(&ctx.lines, sink)?;

        if rows.is_empty() {
            return Err(ParseError::NoRecords {
                parser: parser.name().to_string(),
            }
            .into());
        }

        debug!("Parsed {} rows", rows.len());
        ctx.rows = rows;
        Ok(())
    }

    fn step_write(&self, ctx: &mut PipelineContext) -> Result<WrittenFiles, PipelineError> {
        let written = self.writer.write(
            &ctx.rows,
            ctx.unit.output_dir(),
            ctx.unit.archive_dir(),
            &ctx.unit.input_path,
        )?;

        ctx.written = Some(written.clone());
        Ok(written)
    }

    fn fail(
        &self,
        ctx: PipelineContext,
        filename: String,
        error: PipelineError,
        sink: &dyn EventSink,
    ) -> (UnitResult, PipelineContext) {
        let stage = error.stage();
        let message = error.to_string();

        sink.report(ImportEvent::UnitFailed {
            unit_id: ctx.unit.id.clone(),
            source: ctx.unit.source.name.clone(),
            file: filename,
            stage,
            error: message.clone(),
        });

        (UnitResult::failed(&ctx.unit, stage, message), ctx)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
