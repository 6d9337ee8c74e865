//! Flat, display-ready view of one NFS-e record.
//!
//! Every string here is already normalised: tax ids, postal codes, phones,
//! dates and amounts went through [`crate::format`], enumerations through
//! [`crate::codes`]. The layout engine prints them verbatim.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentData {
    pub identification: Identification,
    pub issuer: Issuer,
    pub payer: Payer,
    pub service: Service,
    pub taxation: Taxation,
    pub values: Values,
    pub tax_totals: TaxTotals,
    pub authority: Authority,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identification {
    pub access_key: String,
    pub number: String,
    pub dfse_number: String,
    /// Competence date of the declaration (`dCompet`).
    pub competence: String,
    /// DPS emission timestamp (`dhEmi`).
    pub emitted_at: String,
    /// NFS-e processing timestamp (`dhProc`).
    pub processed_at: String,
    pub dps_number: String,
    pub dps_series: String,
    pub issuance_locality: String,
    pub rendering_locality: String,
    pub taxation_locality: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub complement: String,
    pub district: String,
    /// IBGE municipality code.
    pub municipality_code: String,
    pub state: String,
    pub postal_code: String,
}

impl Address {
    /// `street, number[, complement], district` with blank parts skipped.
    pub fn display_line(&self) -> String {
        [&self.street, &self.number, &self.complement, &self.district]
            .into_iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Issuer {
    pub tax_id: String,
    pub municipal_registration: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: Address,
    /// `<issuing locality> - <UF>`.
    pub municipality: String,
    pub simples_nacional: String,
    pub simples_nacional_regime: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payer {
    pub tax_id: String,
    pub municipal_registration: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: Address,
    /// Display name of the payer municipality, see
    /// [`DocumentData::with_overrides`].
    pub municipality: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Service {
    pub national_code: String,
    pub national_description: String,
    pub municipal_code: String,
    pub municipal_description: String,
    pub nbs_code: String,
    /// Taxpayer's own service code (`cIntContrib`).
    pub supplementary_code: String,
    pub description: String,
    pub rendering_country: String,
    pub notes: String,
}

impl Service {
    /// `01.03.02 - description`, or whichever half is present.
    pub fn national_classification(&self) -> String {
        join_code(&self.national_code, &self.national_description)
    }

    pub fn municipal_classification(&self) -> String {
        join_code(&self.municipal_code, &self.municipal_description)
    }
}

fn join_code(code: &str, description: &str) -> String {
    match (code.is_empty(), description.is_empty()) {
        (false, false) => format!("{} - {}", code, description),
        (false, true) => code.to_string(),
        (true, false) => description.to_string(),
        (true, true) => crate::codes::FALLBACK.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Taxation {
    pub issqn_taxation: String,
    pub immunity_type: String,
    pub suspension_type: String,
    pub suspension_process: String,
    pub issqn_withholding: String,
    pub pis_cofins_withholding: String,
    pub special_regime: String,
    pub benefit_number: String,
    pub result_country: String,
    pub applied_rate: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    pub service_value: String,
    pub unconditional_discount: String,
    pub conditional_discount: String,
    pub deductions: String,
    pub benefit_reduction: String,
    pub issqn_base: String,
    pub issqn_amount: String,
    /// ISSQN amount when withheld by the payer or intermediary, else `-`.
    pub issqn_withheld: String,
    pub irrf_withheld: String,
    pub cp_withheld: String,
    pub csll_withheld: String,
    pub pis_amount: String,
    pub cofins_amount: String,
    /// IRRF + CP + CSLL, always summed.
    pub federal_withheld: String,
    /// PIS and/or COFINS, gated by the PIS/COFINS withholding code.
    pub pis_cofins_withheld: String,
    pub federal_total: String,
    pub net_value: String,
}

/// Approximate tax burden shares (`totTrib`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxTotals {
    pub federal: String,
    pub state: String,
    pub municipal: String,
    /// Single Simples Nacional share (`pTotTribSN`), when that is what the
    /// issuer declared instead of per-sphere totals.
    pub simples_nacional: String,
}

/// Issuing-authority header block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Authority {
    pub name: String,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub crest: Option<crate::assets::ImageSource>,
}

impl Authority {
    pub fn lines(&self) -> Vec<&str> {
        [&self.department, &self.phone, &self.email]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .filter(|v| !v.trim().is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_line_skips_blank_parts() {
        let address = Address {
            street: "Rua das Flores".into(),
            number: "100".into(),
            complement: " ".into(),
            district: "Centro".into(),
            ..Address::default()
        };
        assert_eq!(address.display_line(), "Rua das Flores, 100, Centro");
    }

    #[test]
    fn classification_joins_code_and_text() {
        let service = Service {
            national_code: "01.03.02".into(),
            national_description: "Processamento de dados".into(),
            ..Service::default()
        };
        assert_eq!(
            service.national_classification(),
            "01.03.02 - Processamento de dados"
        );
        assert_eq!(service.municipal_classification(), "-");
    }

    #[test]
    fn authority_lines_only_list_present_values() {
        let authority = Authority {
            name: "Prefeitura Municipal de Criciúma".into(),
            department: Some("Secretaria Municipal da Fazenda".into()),
            phone: None,
            email: Some("".into()),
            crest: None,
        };
        assert_eq!(authority.lines(), vec!["Secretaria Municipal da Fazenda"]);
    }
}
