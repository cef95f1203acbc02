use crate::engine::reconcile::Action;
use crate::engine::report::Report;
use crate::error::{EtlError, Stage};

pub const AUTH_OK: &str = "Autenticación exitosa en Google Drive";
pub const FOLDER_HAS_FILES: &str = "La carpeta de extracción contiene al menos un archivo";
pub const FOLDER_HAS_XLSX: &str = "La carpeta de extracción contiene un archivo XLSX";
pub const CAPACITY_LOADED: &str =
    "El archivo de capacidad de generación fue cargado y transformado exitosamente";
pub const DISPATCH_LOADED: &str =
    "El archivo \"Despacho programado recursos de generación\" fue cargado y transformado exitosamente";
pub const PRICE_LOADED: &str =
    "El archivo \"Precio de bolsa ponderado\" fue cargado y transformado exitosamente";
pub const BALANCE_DONE: &str = "El balance de energía fue calculado exitosamente";
pub const REPORT_SENT: &str = "Informe enviado y guardado exitosamente";
pub const STOPPED: &str = "\u{23f9}\u{fe0f} Proceso finalizado.";
pub const NOT_AUTHORIZED: &str = "Este chat no está autorizado para ejecutar el proceso.";

const CAPACITY_FILE: &str = "El archivo de capacidad de generación contiene";

fn dataset_name(stage: Stage) -> &'static str {
    match stage {
        Stage::PriceFetch => "Precio de bolsa ponderado",
        _ => "Despacho programado recursos de generación",
    }
}

/// Operator-facing text for a failed run. Technical detail stays in the logs.
pub fn failure_text(err: &EtlError) -> String {
    match err {
        EtlError::AuthFailure(_) => "Error de autenticación en Google Drive".into(),
        EtlError::EmptySourceFolder => "La carpeta de extracción no contiene algún archivo".into(),
        EtlError::MissingExpectedFile => "La carpeta de extracción no contiene un archivo XLSX".into(),
        EtlError::MalformedSource(_) => {
            "El archivo de capacidad de generación no es un libro XLSX válido".into()
        }
        EtlError::IncompleteDataset(column) => {
            format!("{CAPACITY_FILE} valores nulos en la columna \"{}\"", column.label())
        }
        EtlError::InvalidDate => format!("{CAPACITY_FILE} al menos un registro con una fecha no válida"),
        EtlError::NonNumericCapacity => format!(
            "{CAPACITY_FILE} al menos un registro con un valor no numérico en la columna \"CAPACIDAD (Kwh)\""
        ),
        EtlError::MixedDates => {
            format!("{CAPACITY_FILE} al menos un registro con una fecha distinta a las demás")
        }
        EtlError::UnknownPlantCode => format!(
            "{CAPACITY_FILE} al menos un registro con un valor diferente a los generadores de interés en la columna \"CODIGO\""
        ),
        EtlError::NetworkTimeout(stage) => match stage {
            Stage::Drive => "La solicitud a Google Drive excedió el tiempo de espera".into(),
            Stage::UploadAuth => "La autenticación en FastUpload excedió el tiempo de espera".into(),
            Stage::Upload => "La subida del informe a FastUpload excedió el tiempo de espera".into(),
            s => format!(
                "La solicitud del \"{}\" a la API del SIMEM excedió el tiempo de espera",
                dataset_name(*s)
            ),
        },
        EtlError::NetworkError(stage) => match stage {
            Stage::Drive => "Error de conexión con Google Drive".into(),
            Stage::UploadAuth => "Error de conexión a FastUpload durante la autenticación".into(),
            Stage::Upload => "Error de conexión a FastUpload durante la subida del informe".into(),
            s => format!(
                "Error de conexión a la API del SIMEM al solicitar el \"{}\"",
                dataset_name(*s)
            ),
        },
        EtlError::MalformedFeed(stage, _) => format!(
            "La respuesta del SIMEM para el \"{}\" no tiene el formato esperado",
            dataset_name(*stage)
        ),
        EtlError::MissingPriceRow => {
            "El \"Precio de bolsa ponderado\" no contiene el precio PPBOGReal versión TXR".into()
        }
        EtlError::AmbiguousPriceRow(n) => format!(
            "El \"Precio de bolsa ponderado\" contiene {n} precios PPBOGReal versión TXR; se esperaba uno"
        ),
        EtlError::BalanceOverflow(code) => format!(
            "Los totales de energía del generador {code} superan el rango de cálculo; revise los valores de \"CAPACIDAD (Kwh)\""
        ),
        EtlError::UploadAuthFailure => "Error de autenticación en FastUpload".into(),
        EtlError::UploadFailure => "Error al subir el informe a FastUpload".into(),
        EtlError::DriveUploadFailure(_) => "Error al guardar el informe en Google Drive".into(),
        EtlError::MissingReport(_) => {
            "No hay un informe de balance de energía generado hoy; ejecute /balance primero".into()
        }
        EtlError::ReportWrite(_) => "Error al guardar los archivos del informe".into(),
    }
}

/// Thousands grouping as used in Colombia: 1.234.567
pub fn format_cop(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

pub fn format_balance(report: &Report) -> String {
    let Some(first) = report.rows.first() else {
        return "\u{26a1} Balance de energía\n\nNingún generador tuvo datos coincidentes de capacidad y despacho.".into();
    };
    let mut lines = vec![format!("\u{26a1} Balance de energía {}\n", first.date.format("%Y-%m-%d"))];
    for row in &report.rows {
        let icon = match row.action {
            Action::Sell => "\u{1f7e2}",
            Action::Buy => "\u{1f534}",
        };
        lines.push(format!(
            "{icon} {}: {} kWh \u{2192} {} COP ({})",
            row.plant_code,
            format_cop(row.balance_kwh),
            format_cop(row.value_cop),
            row.action
        ));
    }
    lines.join("\n")
}

pub fn welcome_message() -> String {
    "\u{26a1} Balance de energía\n\n\
     Concilia la capacidad de generación con el despacho programado y el precio de bolsa del SIMEM.\n\n\
     /balance \u{2014} Ejecutar el proceso\n\
     /enviar \u{2014} Enviar y guardar el informe\n\
     /ayuda \u{2014} Ver esta ayuda"
        .into()
}
