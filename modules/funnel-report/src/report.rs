use std::str::FromStr;

use serde::Serialize;

use crate::aggregator::SourceTable;
use crate::outcome::SourceCounters;

/// Width of every row: filled columns A..R plus six analyst columns S..X.
pub const REPORT_COLUMNS: usize = 24;

/// One spreadsheet cell. Serializes to the raw value a spreadsheet API takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(u64),
    Formula(String),
}

impl Cell {
    pub fn blank() -> Self {
        Cell::Text(String::new())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn as_raw(&self) -> String {
        match self {
            Cell::Text(s) | Cell::Formula(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }
}

/// Header row plus one row per source with at least one lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReportMatrix {
    rows: Vec<Vec<Cell>>,
}

impl ReportMatrix {
    pub fn header_only(locale: FormulaLocale) -> Self {
        Self {
            rows: vec![header_row(locale)],
        }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn header(&self) -> &[Cell] {
        &self.rows[0]
    }

    pub fn data_rows(&self) -> &[Vec<Cell>] {
        &self.rows[1..]
    }

    /// Data row for a source, looked up by the name in column A.
    pub fn row_for(&self, source_name: &str) -> Option<&[Cell]> {
        self.data_rows()
            .iter()
            .find(|row| matches!(row.first(), Some(Cell::Text(name)) if name == source_name))
            .map(Vec::as_slice)
    }
}

/// Spreadsheet locale the formulas are written for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormulaLocale {
    #[default]
    En,
    Ru,
}

impl FromStr for FormulaLocale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(FormulaLocale::En),
            "ru" => Ok(FormulaLocale::Ru),
            other => Err(format!("unknown report locale: {other} (expected en or ru)")),
        }
    }
}

const TITLES_EN: [&str; REPORT_COLUMNS] = [
    "Source",
    "Ad cabinet",
    "Leads",
    "Budget",
    "Budget incl. VAT",
    "Cost per lead incl. VAT",
    "Conversion",
    "Bookings total",
    "Cost per booking",
    "%CV trial/booking",
    "Trials total",
    "%CV purchase/trial",
    "Purchases total",
    "",
    "Cost per client",
    "Bookings by month end",
    "Trials by month end",
    "Purchases by month end",
    "Visits",
    "Visits per student",
    "CV booking/lead by month end",
    "CV2 trial/booking by month end",
    "CV purchase/trial by month end",
    "CV purchase/lead by month end",
];

const TITLES_RU: [&str; REPORT_COLUMNS] = [
    "Источник",
    "Из Кабинета",
    "Лиды",
    "Бюджет",
    "С НДС",
    "Цена Лида С НДС",
    "Конверсия",
    "Записи Всего",
    "Цена записи",
    "%CV пробное/зап",
    "Пробное всего",
    "%CV покупка/пробное",
    "Покупка всего",
    "",
    "цена клиента",
    "Записи до конца мес",
    "Пробников до конца мес",
    "Покупок до конца мес",
    "посещений",
    "посещений на ученика",
    "cv зап/лид до конца мес",
    "cv2 проб/зап до конца мес",
    "cv покупка/проб до конца мес",
    "cv покупка/лид до конца мес",
];

/// VAT multiplier applied to the manually entered budget.
const VAT_FACTOR: &str = "1.2";

impl FormulaLocale {
    pub fn titles(&self) -> &'static [&'static str; REPORT_COLUMNS] {
        match self {
            FormulaLocale::En => &TITLES_EN,
            FormulaLocale::Ru => &TITLES_RU,
        }
    }

    /// Display name of the synthetic source for contacts without one.
    pub fn no_source_name(&self) -> &'static str {
        match self {
            FormulaLocale::En => "No source",
            FormulaLocale::Ru => "Без источника",
        }
    }

    fn if_fn(&self) -> &'static str {
        match self {
            FormulaLocale::En => "IF",
            FormulaLocale::Ru => "ЕСЛИ",
        }
    }

    fn separator(&self) -> &'static str {
        match self {
            FormulaLocale::En => ",",
            FormulaLocale::Ru => ";",
        }
    }

    /// `budget * VAT`, 0 when the budget cell is empty.
    fn with_vat(&self, budget: char, row: usize) -> String {
        let (is_blank, factor) = match self {
            FormulaLocale::En => ("ISBLANK", VAT_FACTOR.to_string()),
            FormulaLocale::Ru => ("ЕПУСТО", VAT_FACTOR.replace('.', ",")),
        };
        let sep = self.separator();
        format!(
            "={if_fn}({is_blank}({budget}{row}){sep} 0{sep} {budget}{row}*{factor})",
            if_fn = self.if_fn()
        )
    }

    /// `numerator / denominator`, 0 when the denominator is zero.
    fn ratio(&self, numerator: char, denominator: char, row: usize) -> String {
        let sep = self.separator();
        format!(
            "={if_fn}({denominator}{row}=0{sep} 0{sep} {numerator}{row}/{denominator}{row})",
            if_fn = self.if_fn()
        )
    }
}

fn header_row(locale: FormulaLocale) -> Vec<Cell> {
    locale.titles().iter().map(|t| Cell::text(*t)).collect()
}

/// Turns the counter table into the report matrix.
pub struct ReportBuilder {
    locale: FormulaLocale,
}

impl ReportBuilder {
    pub fn new(locale: FormulaLocale) -> Self {
        Self { locale }
    }

    pub fn build(&self, table: &SourceTable) -> ReportMatrix {
        let mut matrix = ReportMatrix::header_only(self.locale);
        for (source, counters) in table.iter() {
            if counters.leads == 0 {
                continue;
            }
            // spreadsheet rows are 1-based and row 1 is the header
            let row = matrix.rows.len() + 1;
            matrix.rows.push(self.source_row(&source.name, counters, row));
        }
        matrix
    }

    fn source_row(&self, name: &str, c: &SourceCounters, row: usize) -> Vec<Cell> {
        let l = self.locale;
        let mut cells = vec![
            Cell::text(name),                       // A source
            Cell::blank(),                          // B ad cabinet (manual)
            Cell::Number(c.leads),                  // C leads
            Cell::blank(),                          // D budget (manual)
            Cell::Formula(l.with_vat('D', row)),    // E budget incl. VAT
            Cell::Formula(l.ratio('E', 'C', row)),  // F cost per lead
            Cell::Formula(l.ratio('H', 'C', row)),  // G lead → booking
            Cell::Number(c.bookings),               // H bookings
            Cell::Formula(l.ratio('E', 'H', row)),  // I cost per booking
            Cell::Formula(l.ratio('K', 'H', row)),  // J booking → trial
            Cell::Number(c.admissions),             // K trials
            Cell::Formula(l.ratio('M', 'K', row)),  // L trial → purchase
            Cell::Number(c.purchases),              // M purchases
            Cell::blank(),                          // N spacer
            Cell::Formula(l.ratio('E', 'M', row)),  // O cost per client
            Cell::Number(c.bookings_in_window),     // P
            Cell::Number(c.admissions_in_window),   // Q
            Cell::Number(c.purchases_in_window),    // R
        ];
        cells.resize(REPORT_COLUMNS, Cell::blank());
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listok_client::Source;

    fn table_with(rows: &[(i64, &str, SourceCounters)]) -> SourceTable {
        let sources: Vec<Source> = rows.iter().map(|(id, n, _)| Source::new(*id, *n)).collect();
        let mut table = SourceTable::seeded(&sources, "No source");
        for (id, _, counters) in rows {
            *table.counters_mut(*id).unwrap() = *counters;
        }
        table
    }

    fn counters(leads: u64) -> SourceCounters {
        SourceCounters {
            leads,
            ..Default::default()
        }
    }

    #[test]
    fn header_has_fixed_titles() {
        let matrix = ReportMatrix::header_only(FormulaLocale::Ru);
        assert_eq!(matrix.header().len(), REPORT_COLUMNS);
        assert_eq!(matrix.header()[0], Cell::text("Источник"));
        assert!(matrix.data_rows().is_empty());
    }

    #[test]
    fn zero_lead_sources_are_omitted() {
        let table = table_with(&[(1, "Instagram", counters(0)), (2, "VK", counters(2))]);

        let matrix = ReportBuilder::new(FormulaLocale::En).build(&table);

        assert_eq!(matrix.data_rows().len(), 1);
        assert!(matrix.row_for("Instagram").is_none());
        assert!(matrix.row_for("No source").is_none());
        assert_eq!(matrix.row_for("VK").unwrap()[2], Cell::Number(2));
    }

    #[test]
    fn formulas_reference_their_own_row() {
        let table = table_with(&[(1, "Instagram", counters(1)), (2, "VK", counters(1))]);

        let matrix = ReportBuilder::new(FormulaLocale::En).build(&table);
        let vk = matrix.row_for("VK").unwrap();

        // header is row 1, Instagram row 2, VK row 3
        assert_eq!(vk[4], Cell::Formula("=IF(ISBLANK(D3), 0, D3*1.2)".into()));
        assert_eq!(vk[5], Cell::Formula("=IF(C3=0, 0, E3/C3)".into()));
        assert_eq!(vk[6], Cell::Formula("=IF(C3=0, 0, H3/C3)".into()));
        assert_eq!(vk[8], Cell::Formula("=IF(H3=0, 0, E3/H3)".into()));
        assert_eq!(vk[9], Cell::Formula("=IF(H3=0, 0, K3/H3)".into()));
        assert_eq!(vk[11], Cell::Formula("=IF(K3=0, 0, M3/K3)".into()));
        assert_eq!(vk[14], Cell::Formula("=IF(M3=0, 0, E3/M3)".into()));
    }

    #[test]
    fn russian_locale_uses_semicolons_and_decimal_comma() {
        let table = table_with(&[(1, "Instagram", counters(1))]);

        let matrix = ReportBuilder::new(FormulaLocale::Ru).build(&table);
        let row = matrix.row_for("Instagram").unwrap();

        assert_eq!(row[4], Cell::Formula("=ЕСЛИ(ЕПУСТО(D2); 0; D2*1,2)".into()));
        assert_eq!(row[5], Cell::Formula("=ЕСЛИ(C2=0; 0; E2/C2)".into()));
    }

    #[test]
    fn rows_are_padded_to_header_width() {
        let table = table_with(&[(1, "Instagram", counters(1))]);

        let matrix = ReportBuilder::new(FormulaLocale::En).build(&table);

        for row in matrix.rows() {
            assert_eq!(row.len(), REPORT_COLUMNS);
        }
        let row = matrix.row_for("Instagram").unwrap();
        assert_eq!(row[13], Cell::blank());
        assert_eq!(row[23], Cell::blank());
    }

    #[test]
    fn serializes_as_plain_values() {
        let table = table_with(&[(1, "Instagram", counters(3))]);
        let matrix = ReportBuilder::new(FormulaLocale::En).build(&table);

        let json = serde_json::to_value(&matrix).unwrap();

        assert_eq!(json[1][0], "Instagram");
        assert_eq!(json[1][2], 3);
        assert_eq!(json[1][1], "");
    }

    #[test]
    fn parses_locale() {
        assert_eq!("RU".parse::<FormulaLocale>(), Ok(FormulaLocale::Ru));
        assert_eq!("en".parse::<FormulaLocale>(), Ok(FormulaLocale::En));
        assert!("de".parse::<FormulaLocale>().is_err());
    }
}
