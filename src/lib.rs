/*!
# Sheet Scrub

Batch cleanup of text cells in `.xlsx` workbooks, with a command-line and a
browser front end.

## Overview

Spreadsheet authors paste text full of bracket markers (`[*]`, `[001]`, ...)
and non-breaking spaces. This crate rewrites every text cell of every sheet
with one fixed rule and hands the workbooks back, leaving numbers, booleans,
formulas, styles and every other part of the file untouched.

## The rule

1. Non-breaking spaces (U+00A0) become ordinary spaces.
2. Each bracket token, together with the whitespace around it, becomes a
   single `/` (`"A [XYZ] B"` → `"A/B"`).
3. Leading whitespace and leading `/` separators are stripped, layer by
   layer (`" [x]/[y] data"` → `"data"`).

Two stricter legacy variants only collapse `[*]` tokens; see
[`normalizer::BracketMode`].

## Architecture

- **Core**: `normalizer` (the rule), `cell` / `workbook` (the in-memory grid)
- **Codec**: `xlsx` decodes a package into the grid and writes back only the
  XML elements whose text changed
- **Boundary**: `loader` (uploads in), `batch` (per-file processing with
  partial-failure reporting), `downloader` (`processed_` naming, zip bundles)
- **Front ends**: `cli` (driven by `src/main.rs`) and `app` behind the `web` feature
  (axum, multipart uploads)

## REST API Endpoints

- `GET /` - Upload form
- `POST /api/process` - Multipart upload (`files`, optional `mode`); returns
  the processed workbook, or a zip archive when several files were sent
- `GET /api/health` - Liveness check
*/

pub mod batch;
pub mod cell;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod normalizer;
pub mod workbook;
pub mod xlsx;

#[cfg(feature = "web")]
pub mod app;

pub use batch::{BatchReport, FileOutcome, ProcessedFile, process_batch, process_file, process_paths};
pub use cell::{Cell, CellValue};
pub use error::ScrubError;
pub use loader::UploadedFile;
pub use normalizer::{BracketMode, Normalizer, normalize};
pub use workbook::{NormalizeStats, Sheet, Workbook};
pub use xlsx::XlsxDocument;
