//! Catálogo canónico: fabricantes, series y productos/accesorios.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manufacturer {
    pub id: Uuid,
    /// Nombre canónico ("HP", "Konica Minolta", ...).
    pub name: String,
    /// Alias reconocibles en texto ("Hewlett-Packard", "KM", ...).
    pub aliases: Vec<String>,
}

impl Manufacturer {
    pub fn new(name: &str, aliases: Vec<String>) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError("nombre de fabricante vacío".to_string()));
        }
        Ok(Manufacturer { id: Uuid::new_v4(),
                          name: name.trim().to_string(),
                          aliases })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: Uuid,
    pub manufacturer_id: Uuid,
    /// Nombre canónico de la serie ("LaserJet Enterprise", "bizhub C").
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub manufacturer_id: Uuid,
    pub series_id: Option<Uuid>,
    /// Número de modelo tal como aparece en documentación ("E87740", "C759").
    pub model_number: String,
    pub product_type: ProductType,
    pub metadata: serde_json::Value,
}

impl Product {
    pub fn new(manufacturer_id: Uuid, model_number: &str, product_type: ProductType) -> Result<Self, DomainError> {
        if model_number.trim().is_empty() {
            return Err(DomainError::ValidationError("model_number vacío".to_string()));
        }
        Ok(Product { id: Uuid::new_v4(),
                     manufacturer_id,
                     series_id: None,
                     model_number: model_number.trim().to_string(),
                     product_type,
                     metadata: serde_json::json!({}) })
    }
}

/// Tipología completa de equipos de oficina y sus accesorios/consumibles.
/// El orden es estable: el discriminante se usa sólo de forma nominal
/// (serializado snake_case), nunca posicional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    // Impresoras
    LaserPrinter,
    InkjetPrinter,
    DotMatrixPrinter,
    ThermalPrinter,
    LedPrinter,
    SolidInkPrinter,
    ProductionPrinter,
    LargeFormatPrinter,
    LabelPrinter,
    PhotoPrinter,
    MobilePrinter,
    ReceiptPrinter,
    CardPrinter,
    // Multifuncionales y copiadoras
    LaserMultifunction,
    InkjetMultifunction,
    ProductionMultifunction,
    A3Multifunction,
    A4Multifunction,
    WideFormatMultifunction,
    DigitalCopier,
    AnalogCopier,
    // Escáneres y fax
    DocumentScanner,
    FlatbedScanner,
    SheetfedScanner,
    BookScanner,
    MicrofilmScanner,
    FaxMachine,
    // Acabado
    StapleFinisher,
    BookletFinisher,
    InnerFinisher,
    FloorFinisher,
    HolePunchUnit,
    FoldingUnit,
    TrimmerUnit,
    StackerUnit,
    SaddleStitchUnit,
    InserterUnit,
    BridgeUnit,
    JobSeparator,
    // Manejo de papel
    PaperFeedUnit,
    HighCapacityFeeder,
    EnvelopeFeeder,
    DocumentFeeder,
    DuplexUnit,
    PaperTray,
    TandemTray,
    BypassTray,
    // Consumibles
    TonerCartridge,
    InkCartridge,
    DrumUnit,
    DeveloperUnit,
    ImagingUnit,
    FuserUnit,
    TransferBelt,
    TransferRoller,
    MaintenanceKit,
    WasteTonerBox,
    StapleCartridge,
    PrintHead,
    InkTank,
    CleaningKit,
    // Opciones de hardware
    MemoryModule,
    HardDriveOption,
    SsdOption,
    NetworkCard,
    WirelessCard,
    FaxBoard,
    ControllerBoard,
    PowerSupplyUnit,
    CasterBase,
    CabinetStand,
    // Software y varios
    PrintServer,
    SoftwareLicense,
    SecurityKit,
    KeyboardOption,
    CardReader,
    Unknown,
}

impl ProductType {
    /// Cantidad total de variantes del enum (estable; usada por migraciones y
    /// validaciones de catálogo).
    pub const COUNT: usize = 77;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_type_serializes_snake_case() {
        let v = serde_json::to_value(ProductType::LaserMultifunction).unwrap();
        assert_eq!(v, serde_json::json!("laser_multifunction"));
    }
}
