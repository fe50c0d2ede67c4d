mod painter;
mod report_view;
mod spinner;
mod table;

pub(crate) use self::painter::Painter;
pub(crate) use self::report_view::ReportView;
pub(crate) use self::spinner::Spinner;
