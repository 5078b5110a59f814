use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Color, Format, Workbook, XlsxError};

use crate::models::ReceiptRecord;

pub const XLSX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const COLUMNS: &[(&str, f64)] = &[
    ("ID", 10.0),
    ("Date", 20.0),
    ("Category", 20.0),
    ("Amount", 15.0),
    ("Mode", 15.0),
    ("Uploader", 25.0),
    ("Note", 40.0),
];

/// Renders an already-fetched, already-ordered receipt list into an xlsx
/// workbook. Purely a shaping step: it never goes back to the store.
pub fn receipt_workbook(receipts: &[ReceiptRecord]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Receipts Report")?;

    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xE0E0E0));
    let money = Format::new().set_num_format("#,##0.00");
    let bold = Format::new().set_bold();
    let bold_money = Format::new().set_bold().set_num_format("#,##0.00");

    for (col, (title, width)) in COLUMNS.iter().enumerate() {
        let col = col as u16;
        worksheet.set_column_width(col, *width)?;
        worksheet.write_string_with_format(0, col, *title, &header)?;
    }

    let mut row = 1u32;
    for receipt in receipts {
        worksheet.write_string(row, 0, receipt.id.to_string())?;
        worksheet.write_string(row, 1, receipt.created_at.format("%Y-%m-%d").to_string())?;
        worksheet.write_string(row, 2, &receipt.category)?;
        worksheet.write_number_with_format(row, 3, to_cell(receipt.amount), &money)?;
        worksheet.write_string(row, 4, receipt.payment_mode.to_string())?;
        worksheet.write_string(row, 5, &receipt.uploader.name)?;
        worksheet.write_string(row, 6, &receipt.note)?;
        row += 1;
    }

    // Blank spacer, then the total line.
    let total: Decimal = receipts.iter().map(|r| r.amount).sum();
    row += 1;
    worksheet.write_string_with_format(row, 2, "TOTAL", &bold)?;
    worksheet.write_number_with_format(row, 3, to_cell(total), &bold_money)?;

    workbook.save_to_buffer()
}

/// Spreadsheet cells are IEEE doubles; this conversion happens only at the
/// presentation edge, after all arithmetic is done in `Decimal`.
fn to_cell(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}
