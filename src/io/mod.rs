//! Workbook adapters: `calamine` on the way in, `rust_xlsxwriter` on the way out.

pub mod excel_read;
pub mod excel_write;
