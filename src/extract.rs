//! NFS-e XML → [`DocumentData`].

use crate::codes::{CodeTable, FALLBACK, parse_code};
use crate::config::{AuthorityInfo, Overrides, PayerLocality};
use crate::error::DanfseError;
use crate::format::{
    format_date, format_date_time, format_money, format_percent, format_phone,
    format_postal_code, format_service_code, format_tax_id, parse_cents,
};
use crate::model::{
    Address, Authority, DocumentData, Identification, Issuer, Payer, Service, TaxTotals, Taxation,
    Values,
};
use roxmltree::{Document, Node};

pub const NFSE_NAMESPACE: &str = "http://www.sped.fazenda.gov.br/nfse";

/// Literal prefix of the `infNFSe/@Id` attribute that is not part of the key.
pub const ACCESS_KEY_PREFIX: &str = "NFS";

/// Parses an NFS-e record. Only malformed XML, a foreign root element and a
/// missing `Id`, `nNFSe` or tax id fail; everything else degrades.
pub fn extract(xml: &str) -> Result<DocumentData, DanfseError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    if !root.has_tag_name((NFSE_NAMESPACE, "NFSe")) {
        return Err(DanfseError::Parse(format!(
            "root element must be NFSe in namespace {}, found {:?}",
            NFSE_NAMESPACE,
            root.tag_name().name()
        )));
    }
    let inf = child(root, "infNFSe")
        .ok_or_else(|| DanfseError::Parse("missing infNFSe element".to_string()))?;

    let id = inf.attribute("Id").map(str::trim).unwrap_or_default();
    if id.is_empty() {
        return Err(DanfseError::Parse("missing infNFSe/@Id access key".to_string()));
    }
    let number = text(Some(inf), &["nNFSe"]);
    if number.is_empty() {
        return Err(DanfseError::Parse("missing nNFSe document number".to_string()));
    }

    let dps = path(inf, &["DPS", "infDPS"]);
    let issuer = extract_issuer(inf, dps);
    let payer = extract_payer(dps);
    if issuer.tax_id.is_empty() && payer.tax_id.is_empty() {
        return Err(DanfseError::Parse(
            "neither issuer nor payer carries a tax id".to_string(),
        ));
    }

    let identification = Identification {
        access_key: access_key_from_id(id),
        number,
        dfse_number: text(Some(inf), &["nDFSe"]),
        competence: format_date(&text(dps, &["dCompet"])),
        emitted_at: format_date_time(&text(dps, &["dhEmi"])),
        processed_at: format_date_time(&text(Some(inf), &["dhProc"])),
        dps_number: text(dps, &["nDPS"]),
        dps_series: text(dps, &["serie"]),
        issuance_locality: text(Some(inf), &["xLocEmi"]),
        rendering_locality: text(Some(inf), &["xLocPrestacao"]),
        taxation_locality: text(Some(inf), &["xLocIncid"]),
    };

    let mut data = DocumentData {
        service: extract_service(inf, dps),
        taxation: extract_taxation(inf, dps),
        values: extract_values(inf, dps),
        tax_totals: extract_tax_totals(dps),
        issuer,
        payer,
        identification,
        authority: Authority::default(),
    };
    data.issuer.municipality = with_state(
        &data.identification.issuance_locality,
        &data.issuer.address.state,
    );
    Ok(data.with_overrides(&Overrides::default()))
}

/// [`extract`] followed by [`DocumentData::with_overrides`].
pub fn extract_with(xml: &str, overrides: &Overrides) -> Result<DocumentData, DanfseError> {
    Ok(extract(xml)?.with_overrides(overrides))
}

impl DocumentData {
    /// Applies caller-supplied display data. Without a payer locality the
    /// payer municipality falls back to the service-rendering locality, or to
    /// the issuing locality when that is blank or the same place.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        self.payer.municipality =
            payer_municipality(&self.identification, overrides.payer_locality.as_ref());
        self.authority = authority(
            &self.identification.issuance_locality,
            overrides.municipality.as_ref(),
        );
        self
    }
}

pub fn access_key_from_id(id: &str) -> String {
    id.strip_prefix(ACCESS_KEY_PREFIX).unwrap_or(id).to_string()
}

/// PIS/COFINS withheld, in hundredths, for a `tpRetPisCofins` code:
/// 1 both, 3 PIS only, 4 COFINS only, anything else neither.
pub fn combined_pis_cofins(code: &str, pis: i64, cofins: i64) -> i64 {
    let code = parse_code(code);
    let mut total = 0;
    if matches!(code, Some(1 | 3)) {
        total += pis;
    }
    if matches!(code, Some(1 | 4)) {
        total += cofins;
    }
    total
}

/// IRRF + CP + CSLL withheld, in hundredths. Not gated by any code.
pub fn combined_federal(irrf: i64, cp: i64, csll: i64) -> i64 {
    irrf + cp + csll
}

fn extract_issuer(inf: Node, dps: Option<Node>) -> Issuer {
    let emit = child(inf, "emit");
    let prest = dps.and_then(|d| child(d, "prest"));
    let ender = emit.and_then(|e| child(e, "enderNac"));
    let reg = prest.and_then(|p| child(p, "regTrib"));

    let tax_id = first_text(emit, &["CNPJ", "CPF"])
        .or_else(|| first_text(prest, &["CNPJ", "CPF"]))
        .map(|raw| format_tax_id(&raw))
        .unwrap_or_default();

    Issuer {
        tax_id,
        municipal_registration: or_fallback(
            first_text(emit, &["IM"]).or_else(|| first_text(prest, &["IM"])),
        ),
        name: text(emit, &["xNome"]),
        phone: format_phone(
            &first_text(emit, &["fone"])
                .or_else(|| first_text(prest, &["fone"]))
                .unwrap_or_default(),
        ),
        email: or_fallback(first_text(emit, &["email"]).or_else(|| first_text(prest, &["email"]))),
        address: Address {
            street: text(ender, &["xLgr"]),
            number: text(ender, &["nro"]),
            complement: text(ender, &["xCpl"]),
            district: text(ender, &["xBairro"]),
            municipality_code: text(ender, &["cMun"]),
            state: text(ender, &["UF"]),
            postal_code: format_postal_code(&text(ender, &["CEP"])),
        },
        municipality: String::new(),
        simples_nacional: CodeTable::SimplesNacionalOption
            .resolve(&text(reg, &["opSimpNac"]))
            .to_string(),
        simples_nacional_regime: CodeTable::SimplesNacionalRegime
            .resolve(&text(reg, &["regApTribSN"]))
            .to_string(),
    }
}

fn extract_payer(dps: Option<Node>) -> Payer {
    let toma = dps.and_then(|d| child(d, "toma"));
    let end = toma.and_then(|t| child(t, "end"));

    let tax_id = match first_text(toma, &["CNPJ", "CPF"]) {
        Some(raw) => format_tax_id(&raw),
        None => text(toma, &["NIF"]),
    };

    Payer {
        tax_id,
        municipal_registration: or_fallback(first_text(toma, &["IM"])),
        name: text(toma, &["xNome"]),
        phone: format_phone(&text(toma, &["fone"])),
        email: or_fallback(first_text(toma, &["email"])),
        address: Address {
            street: address_text(end, "xLgr"),
            number: address_text(end, "nro"),
            complement: address_text(end, "xCpl"),
            district: address_text(end, "xBairro"),
            municipality_code: address_text(end, "cMun"),
            state: address_text(end, "UF"),
            postal_code: format_postal_code(&address_text(end, "CEP")),
        },
        municipality: String::new(),
    }
}

fn extract_service(inf: Node, dps: Option<Node>) -> Service {
    let serv = dps.and_then(|d| child(d, "serv"));
    let c_serv = serv.and_then(|s| child(s, "cServ"));

    Service {
        national_code: format_service_code(&text(c_serv, &["cTribNac"])),
        national_description: text(Some(inf), &["xTribNac"]),
        municipal_code: text(c_serv, &["cTribMun"]),
        municipal_description: text(Some(inf), &["xTribMun"]),
        nbs_code: or_fallback(first_text(c_serv, &["cNBS"])),
        supplementary_code: or_fallback(first_text(c_serv, &["cIntContrib"])),
        description: text(c_serv, &["xDescServ"]),
        rendering_country: or_fallback(
            serv.and_then(|s| path(s, &["locPrest", "cPaisPrestacao"]))
                .and_then(node_text),
        ),
        notes: text(serv, &["infoCompl", "xInfComp"]),
    }
}

fn extract_taxation(inf: Node, dps: Option<Node>) -> Taxation {
    let trib = dps.and_then(|d| path(d, &["valores", "trib"]));
    let trib_mun = trib.and_then(|t| child(t, "tribMun"));
    let reg = dps.and_then(|d| path(d, &["prest", "regTrib"]));
    let piscofins = trib.and_then(|t| path(t, &["tribFed", "piscofins"]));

    let rate = first_text(path(inf, &["valores"]), &["pAliqAplic"])
        .or_else(|| first_text(trib_mun, &["pAliq"]));

    Taxation {
        issqn_taxation: resolve(CodeTable::IssqnTaxation, trib_mun, &["tribISSQN"]),
        immunity_type: resolve(CodeTable::ImmunityType, trib_mun, &["tpImunidade"]),
        suspension_type: resolve(CodeTable::SuspensionType, trib_mun, &["exigSusp", "tpSusp"]),
        suspension_process: or_fallback(
            trib_mun
                .and_then(|t| path(t, &["exigSusp", "nProcesso"]))
                .and_then(node_text),
        ),
        issqn_withholding: resolve(CodeTable::IssqnWithholding, trib_mun, &["tpRetISSQN"]),
        pis_cofins_withholding: resolve(CodeTable::PisCofinsWithholding, piscofins, &["tpRetPisCofins"]),
        special_regime: resolve(CodeTable::SpecialRegime, reg, &["regEspTrib"]),
        benefit_number: or_fallback(
            trib_mun
                .and_then(|t| path(t, &["BM", "nBM"]))
                .and_then(node_text),
        ),
        result_country: or_fallback(first_text(trib_mun, &["cPaisResult"])),
        applied_rate: rate.map(|r| format_percent(&r)).unwrap_or_else(|| FALLBACK.to_string()),
    }
}

fn extract_values(inf: Node, dps: Option<Node>) -> Values {
    let nfse_values = child(inf, "valores");
    let dps_values = dps.and_then(|d| child(d, "valores"));
    let trib = dps_values.and_then(|v| child(v, "trib"));
    let trib_mun = trib.and_then(|t| child(t, "tribMun"));
    let trib_fed = trib.and_then(|t| child(t, "tribFed"));
    let piscofins = trib_fed.and_then(|t| child(t, "piscofins"));

    let irrf = text(trib_fed, &["vRetIRRF"]);
    let cp = text(trib_fed, &["vRetCP"]);
    let csll = text(trib_fed, &["vRetCSLL"]);
    let pis = text(piscofins, &["vPis"]);
    let cofins = text(piscofins, &["vCofins"]);
    let issqn_amount = text(nfse_values, &["vISSQN"]);

    let federal = combined_federal(cents(&irrf), cents(&cp), cents(&csll));
    let pis_cofins = combined_pis_cofins(
        &text(piscofins, &["tpRetPisCofins"]),
        cents(&pis),
        cents(&cofins),
    );
    let federal_total = federal + cents(&pis) + cents(&cofins);

    let issqn_withheld = match parse_code(&text(trib_mun, &["tpRetISSQN"])) {
        Some(2 | 3) => money(&issqn_amount),
        _ => FALLBACK.to_string(),
    };

    Values {
        service_value: money(&text(dps_values, &["vServPrest", "vServ"])),
        unconditional_discount: money(&text(dps_values, &["vDescCondIncond", "vDescIncond"])),
        conditional_discount: money(&text(dps_values, &["vDescCondIncond", "vDescCond"])),
        deductions: money(&text(dps_values, &["vDedRed", "vDR"])),
        benefit_reduction: money(&text(trib_mun, &["BM", "vRedBCBM"])),
        issqn_base: money(&text(nfse_values, &["vBC"])),
        issqn_amount: money(&issqn_amount),
        issqn_withheld,
        irrf_withheld: money(&irrf),
        cp_withheld: money(&cp),
        csll_withheld: money(&csll),
        pis_amount: money(&pis),
        cofins_amount: money(&cofins),
        federal_withheld: format_money(federal),
        pis_cofins_withheld: format_money(pis_cofins),
        federal_total: format_money(federal_total),
        net_value: money(&text(nfse_values, &["vLiq"])),
    }
}

fn extract_tax_totals(dps: Option<Node>) -> TaxTotals {
    let tot = dps.and_then(|d| path(d, &["valores", "trib", "totTrib"]));
    let fallback = || FALLBACK.to_string();

    if let Some(v) = tot.and_then(|t| child(t, "vTotTrib")) {
        return TaxTotals {
            federal: money(&text(Some(v), &["vTotTribFed"])),
            state: money(&text(Some(v), &["vTotTribEst"])),
            municipal: money(&text(Some(v), &["vTotTribMun"])),
            simples_nacional: fallback(),
        };
    }
    if let Some(p) = tot.and_then(|t| child(t, "pTotTrib")) {
        return TaxTotals {
            federal: percent(&text(Some(p), &["pTotTribFed"])),
            state: percent(&text(Some(p), &["pTotTribEst"])),
            municipal: percent(&text(Some(p), &["pTotTribMun"])),
            simples_nacional: fallback(),
        };
    }
    TaxTotals {
        federal: fallback(),
        state: fallback(),
        municipal: fallback(),
        simples_nacional: percent(&text(tot, &["pTotTribSN"])),
    }
}

fn payer_municipality(id: &Identification, locality: Option<&PayerLocality>) -> String {
    if let Some(locality) = locality.filter(|l| !l.name.trim().is_empty()) {
        return with_state(locality.name.trim(), locality.uf.trim());
    }
    let rendering = id.rendering_locality.trim();
    let issuing = id.issuance_locality.trim();
    if rendering.is_empty() || rendering == issuing {
        if issuing.is_empty() {
            FALLBACK.to_string()
        } else {
            issuing.to_string()
        }
    } else {
        rendering.to_string()
    }
}

fn authority(issuing_locality: &str, info: Option<&AuthorityInfo>) -> Authority {
    let name = format!("Prefeitura Municipal de {}", issuing_locality.trim());
    match info {
        Some(info) => Authority {
            name,
            department: info.department.clone(),
            phone: info.phone.clone(),
            email: info.email.clone(),
            crest: info.image.clone(),
        },
        None => Authority {
            name,
            ..Authority::default()
        },
    }
}

fn with_state(city: &str, state: &str) -> String {
    match (city.is_empty(), state.is_empty()) {
        (true, true) => FALLBACK.to_string(),
        (false, true) => city.to_string(),
        (true, false) => state.to_string(),
        (false, false) => format!("{} - {}", city, state),
    }
}

fn money(raw: &str) -> String {
    if raw.is_empty() {
        FALLBACK.to_string()
    } else {
        format_money(raw)
    }
}

fn percent(raw: &str) -> String {
    if raw.is_empty() {
        FALLBACK.to_string()
    } else {
        format_percent(raw)
    }
}

fn cents(raw: &str) -> i64 {
    parse_cents(raw).unwrap_or(0)
}

fn resolve(table: CodeTable, base: Option<Node>, names: &[&str]) -> String {
    table.resolve(&text(base, names)).to_string()
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name((NFSE_NAMESPACE, name)))
}

fn path<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Option<Node<'a, 'input>> {
    names.iter().try_fold(node, |current, name| child(current, name))
}

fn node_text(node: Node) -> Option<String> {
    let value = node.text().map(str::trim).unwrap_or_default();
    (!value.is_empty()).then(|| value.to_string())
}

/// Trimmed text at `names` below `base`, empty when absent.
fn text(base: Option<Node>, names: &[&str]) -> String {
    base.and_then(|b| path(b, names))
        .and_then(node_text)
        .unwrap_or_default()
}

/// Text of the first present child among `names`.
fn first_text(base: Option<Node>, names: &[&str]) -> Option<String> {
    let base = base?;
    names
        .iter()
        .find_map(|name| child(base, name).and_then(node_text))
}

/// Payer address fields sit either directly in `end` or in `end/endNac`
/// depending on the layout version.
fn address_text(end: Option<Node>, name: &str) -> String {
    let direct = text(end, &[name]);
    if !direct.is_empty() {
        return direct;
    }
    text(end, &["endNac", name])
}

fn or_fallback(value: Option<String>) -> String {
    value.unwrap_or_else(|| FALLBACK.to_string())
}
