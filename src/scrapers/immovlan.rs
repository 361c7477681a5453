use crate::http_client::is_tracking_url;
use crate::models::{Area, Category, Field, Flag, ListingDetailRecord};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

pub const SITE_URL: &str = "https://immovlan.be";

pub const DEFAULT_SEARCH_TEMPLATE: &str = "https://immovlan.be/en/real-estate?transactiontypes=for-sale,in-public-sale&propertytypes=house,apartment&municipals={area}&noindex=1";

const DETAIL_PATH_MARKER: &str = "/detail/";
const TITLE_SELECTOR: &str = ".detail__header_title_main";
const PRICE_SELECTOR: &str = ".detail__header_price_data";
const ADDRESS_SELECTOR: &str = ".detail__header_address";

/// Search-result URL for `area`, page `page` (1-based)
pub fn build_search_url(template: &str, area: &Area, page: u32) -> String {
    let encoded = urlencoding::encode(&area.name.to_lowercase()).into_owned();
    let base = if template.contains("{area}") {
        template.replace("{area}", &encoded)
    } else {
        tracing::warn!("Search template has no {{area}} placeholder, area '{}' is ignored", area);
        template.to_string()
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}page={}", base, separator, page)
}

/// The one canonical form used for every URL comparison.
///
/// Forces https, drops the default port, query string and fragment, and trims
/// a trailing slash. Returns `None` for anything that is not an absolute
/// http(s) URL.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut url = url::Url::parse(raw.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.host_str()?;

    url.set_scheme("https").ok()?;
    url.set_port(None).ok()?;
    url.set_query(None);
    url.set_fragment(None);

    let trimmed = url.path().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        url.set_path("/");
    } else {
        url.set_path(&trimmed);
    }
    Some(url.to_string())
}

/// True for the site's listing-detail pages (not navigation, not ads)
pub fn is_listing_url(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or("").to_lowercase();
    let on_site = host == "immovlan.be" || host.ends_with(".immovlan.be");
    on_site && parsed.path().contains(DETAIL_PATH_MARKER) && !is_tracking_url(url)
}

/// Resolve a link found on a page against the site root
fn absolutize(href: &str) -> Option<String> {
    let base = url::Url::parse(SITE_URL).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// Listing URLs on one search-result page, canonical, sorted and unique.
///
/// Links come from the DOM anchors and from JSON payloads the page embeds
/// (`items` / `list` / `results` arrays carrying `detailUrl` or `url`).
pub fn extract_listing_urls(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = BTreeSet::new();

    if let Ok(anchor_selector) = Selector::parse("a[href]") {
        for anchor in document.select(&anchor_selector) {
            if let Some(href) = anchor.value().attr("href") {
                if href.contains(DETAIL_PATH_MARKER) {
                    if let Some(url) = absolutize(href) {
                        links.insert(url);
                    }
                }
            }
        }
    }

    if let Ok(script_selector) = Selector::parse("script[type='application/json'], script#__NEXT_DATA__") {
        for script in document.select(&script_selector) {
            let body: String = script.text().collect();
            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(value) => collect_json_links(&value, &mut links),
                Err(e) => tracing::trace!("Skipping non-JSON script block: {}", e),
            }
        }
    }

    let before = links.len();
    let listing_urls: BTreeSet<String> = links
        .into_iter()
        .filter(|url| is_listing_url(url))
        .filter_map(|url| canonical_url(&url))
        .collect();

    if listing_urls.len() < before {
        tracing::trace!("Discarded {} non-listing links", before - listing_urls.len());
    }
    listing_urls.into_iter().collect()
}

fn collect_json_links(value: &serde_json::Value, links: &mut BTreeSet<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for container in ["items", "list", "results"] {
                if let Some(serde_json::Value::Array(items)) = map.get(container) {
                    for item in items {
                        let url = item
                            .get("detailUrl")
                            .or_else(|| item.get("url"))
                            .and_then(|v| v.as_str());
                        if let Some(url) = url.filter(|u| u.starts_with("http")) {
                            links.insert(url.to_string());
                        }
                    }
                }
            }
            for child in map.values() {
                collect_json_links(child, links);
            }
        }
        serde_json::Value::Array(items) => {
            for child in items {
                collect_json_links(child, links);
            }
        }
        _ => {}
    }
}

/// A real listing page carries the detail header; login/home redirects and
/// expired sessions do not.
pub fn looks_like_listing_page(html: &str) -> bool {
    let document = Html::parse_document(html);
    [TITLE_SELECTOR, PRICE_SELECTOR]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .any(|selector| document.select(&selector).next().is_some())
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Collect `<h4>label</h4><p>value</p>` pairs, keyed by lower-cased label
fn label_values(document: &Html) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let Ok(heading_selector) = Selector::parse("h4") else {
        return values;
    };

    for heading in document.select(&heading_selector) {
        let label = element_text(heading).to_lowercase();
        let value = heading
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|sibling| sibling.value().name() == "p")
            .map(element_text);

        if let Some(value) = value.filter(|v| !v.is_empty()) {
            values.entry(label).or_insert(value);
        }
    }
    values
}

/// Parse one listing page into the fixed schema.
///
/// Each field is located and parsed on its own; anything absent or
/// unparseable becomes missing without affecting the other fields.
pub fn parse_listing_detail(html: &str, town: &str, page: u32, url: &str) -> ListingDetailRecord {
    let document = Html::parse_document(html);
    let labels = label_values(&document);
    let mut record = ListingDetailRecord::empty(town, page, url);

    let field = |label: &str| labels.get(label).map(String::as_str);

    record.property_type = select_text(&document, TITLE_SELECTOR)
        .and_then(|title| title.split_whitespace().next().map(Category::new))
        .into();
    record.price = select_text(&document, PRICE_SELECTOR)
        .and_then(|text| parse_price(&text))
        .into();

    let address = select_text(&document, ADDRESS_SELECTOR);
    if let Some(address) = &address {
        let (postal_code, city) = split_address(address);
        record.postal_code = postal_code.into();
        record.city = city.into();
    }
    record.address = address.into();

    record.bedrooms = parsed(field("number of bedrooms"), parse_count);
    record.bedroom1_surface = parsed(field("surface bedroom 1"), parse_decimal);
    record.bedroom2_surface = parsed(field("surface bedroom 2"), parse_decimal);
    record.bathrooms = parsed(field("number of bathrooms"), parse_count);
    record.toilets = parsed(field("number of toilets"), parse_count);
    record.surface_livable = parsed(field("livable surface"), parse_decimal);
    record.terrace = parsed(field("terrace"), parse_flag);
    record.terrace_surface = parsed(field("surface terrace"), parse_decimal);
    record.terrace_orientation = parsed(field("terrace orientation"), parse_category);
    record.floor = parsed(field("floor of appartment").or(field("floor")), parse_floor);
    record.year_built = parsed(field("build year"), parse_year);
    record.condition = parsed(field("state of the property"), parse_category);
    record.kitchen_equipment = parsed(field("kitchen equipment"), parse_category);
    record.cellar = parsed(field("cellar"), parse_flag);
    record.glazing_type = parsed(field("type of glazing"), parse_category);
    record.elevator = parsed(field("elevator"), parse_flag);
    record.entry_phone = parsed(field("entry phone"), parse_flag);
    record.epc_score = parsed(field("specific primary energy consumption"), parse_decimal);
    record.epc_total = parsed(field("yearly total primary energy consumption"), parse_decimal);
    record.epc_valid_until = parsed(field("validity date epc/peb"), parse_date);

    record
}

fn parsed<T>(raw: Option<&str>, parse: fn(&str) -> Option<T>) -> Field<T> {
    match raw {
        Some(text) => {
            let field = Field::from(parse(text));
            if field.is_missing() {
                tracing::trace!("Could not parse value '{}'", text);
            }
            field
        }
        None => Field::Missing,
    }
}

/// "9300 Aalst" -> ("9300", "Aalst"); "Kerkstraat 1, 9000 Gent" -> ("9000", "Gent")
fn split_address(address: &str) -> (Option<String>, Option<String>) {
    let tokens: Vec<&str> = address
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    let Some(position) = tokens
        .iter()
        .rposition(|t| t.len() == 4 && t.chars().all(|c| c.is_ascii_digit()))
    else {
        return (None, None);
    };

    let city = tokens[position + 1..].join(" ");
    let city = if city.is_empty() { None } else { Some(city) };
    (Some(tokens[position].to_string()), city)
}

/// Parse price from text (e.g., "€ 349,000", "349.000 €", "1 250 000 €")
fn parse_price(price_text: &str) -> Option<u64> {
    let number_regex = regex::Regex::new(r"[0-9][0-9.,\s\u{00a0}']*").ok()?;
    let digits: String = number_regex
        .find(price_text)?
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<u64>().ok()
}

/// Parse a decimal with either separator convention ("85 m²", "12,5 m²",
/// "19.853 kWh/year", "1,234.5")
fn parse_decimal(text: &str) -> Option<f64> {
    let number_regex = regex::Regex::new(r"[0-9][0-9.,\u{00a0} ]*[0-9]|[0-9]").ok()?;
    let raw: String = number_regex
        .find(text)?
        .as_str()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let normalized = match (raw.rfind('.'), raw.rfind(',')) {
        (Some(dot), Some(comma)) => {
            let (thousands, decimal) = if dot > comma { (',', '.') } else { ('.', ',') };
            raw.replace(thousands, "").replace(decimal, ".")
        }
        (Some(_), None) => normalize_single_separator(&raw, '.'),
        (None, Some(_)) => normalize_single_separator(&raw, ','),
        (None, None) => raw,
    };
    normalized.parse::<f64>().ok()
}

fn normalize_single_separator(raw: &str, separator: char) -> String {
    let occurrences = raw.matches(separator).count();
    let digits_after = raw
        .rsplit(separator)
        .next()
        .map(|tail| tail.len())
        .unwrap_or(0);

    if occurrences > 1 || digits_after == 3 {
        raw.replace(separator, "")
    } else {
        raw.replace(separator, ".")
    }
}

fn parse_count(text: &str) -> Option<u32> {
    let count_regex = regex::Regex::new(r"[0-9]+").ok()?;
    count_regex.find(text)?.as_str().parse().ok()
}

fn parse_year(text: &str) -> Option<i32> {
    let year_regex = regex::Regex::new(r"\b(1[5-9][0-9]{2}|20[0-9]{2})\b").ok()?;
    year_regex.captures(text)?.get(1)?.as_str().parse().ok()
}

fn parse_floor(text: &str) -> Option<i32> {
    let lower = text.to_lowercase();
    if lower.contains("ground") || lower.contains("rez") || lower.contains("gelijkvloers") {
        return Some(0);
    }
    let floor_regex = regex::Regex::new(r"-?[0-9]+").ok()?;
    floor_regex.find(&lower)?.as_str().parse().ok()
}

fn parse_flag(text: &str) -> Option<Flag> {
    Flag::from_str(text).ok()
}

fn parse_category(text: &str) -> Option<Category> {
    let category = Category::new(text);
    if category.as_str().is_empty() {
        None
    } else {
        Some(category)
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    for format in ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    // Date embedded in longer text ("valid until 31/12/2030")
    let date_regex = regex::Regex::new(r"[0-9]{2}/[0-9]{2}/[0-9]{4}").ok()?;
    let found = date_regex.find(trimmed)?;
    NaiveDate::parse_from_str(found.as_str(), "%d/%m/%Y").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MISSING;

    fn search_page_html(urls: &[&str]) -> String {
        let anchors: String = urls
            .iter()
            .map(|u| format!("<article><a href=\"{}\">Listing</a></article>\n", u))
            .collect();
        format!("<html><body><div class=\"results\">{}</div></body></html>", anchors)
    }

    const DETAIL_HTML: &str = r#"
        <html><body>
          <div class="detail__header">
            <span class="detail__header_title_main">Apartment for sale</span>
            <span class="detail__header_price_data">€ 349,000</span>
            <span class="detail__header_address">Kerkstraat 12, 9300 Aalst</span>
          </div>
          <section>
            <div><h4>Number of bedrooms</h4><p>2</p></div>
            <div><h4>Surface bedroom 1</h4><p>14 m²</p></div>
            <div><h4>Surface bedroom 2</h4><p>11,5 m²</p></div>
            <div><h4>Number of bathrooms</h4><p>1</p></div>
            <div><h4>Number of toilets</h4><p>2</p></div>
            <div><h4>Livable surface</h4><p>92 m²</p></div>
            <div><h4>Terrace</h4><p>Yes</p></div>
            <div><h4>Surface terrace</h4><p>8 m²</p></div>
            <div><h4>Terrace orientation</h4><p>South-West</p></div>
            <div><h4>Floor of appartment</h4><p>3</p></div>
            <div><h4>Build Year</h4><p>2004</p></div>
            <div><h4>State of the property</h4><p>Excellent</p></div>
            <div><h4>Kitchen equipment</h4><p>Fully  equipped</p></div>
            <div><h4>Cellar</h4><p>No</p></div>
            <div><h4>Type of glazing</h4><p>Double glazing</p></div>
            <div><h4>Elevator</h4><p>Yes</p></div>
            <div><h4>Entry phone</h4><p>Yes</p></div>
            <div><h4>Specific primary energy consumption</h4><p>145 kWh/m²/year</p></div>
            <div><h4>Yearly total primary energy consumption</h4><p>13.340 kWh/year</p></div>
            <div><h4>Validity date EPC/PEB</h4><p>31/12/2030</p></div>
          </section>
        </body></html>
    "#;

    const LISTING: &str = "https://immovlan.be/en/detail/apartment/for-sale/9300/aalst/rbu63745";

    #[test]
    fn test_build_search_url() {
        let url = build_search_url(DEFAULT_SEARCH_TEMPLATE, &Area::new("Aalst"), 3);
        assert!(url.contains("municipals=aalst"));
        assert!(url.ends_with("&noindex=1&page=3"));
    }

    #[test]
    fn test_build_search_url_encodes_area() {
        let url = build_search_url(DEFAULT_SEARCH_TEMPLATE, &Area::new("Sint Niklaas"), 1);
        assert!(url.contains("municipals=sint%20niklaas"));
        assert!(!url.contains(' '));
    }

    #[test]
    fn test_build_search_url_without_query() {
        let url = build_search_url("https://immovlan.be/en/{area}", &Area::new("Gent"), 2);
        assert_eq!(url, "https://immovlan.be/en/gent?page=2");
    }

    #[test]
    fn test_canonical_url_rules() {
        let expected = Some(LISTING.to_string());
        assert_eq!(canonical_url(LISTING), expected);
        assert_eq!(canonical_url(&format!("{}/", LISTING)), expected);
        assert_eq!(canonical_url(&LISTING.replace("https", "http")), expected);
        assert_eq!(canonical_url(&format!("{}?utm_source=x#photos", LISTING)), expected);
        assert_eq!(canonical_url("https://IMMOVLAN.be:443/en/detail/a/b"), Some("https://immovlan.be/en/detail/a/b".to_string()));
        assert_eq!(canonical_url("/en/detail/relative"), None);
        assert_eq!(canonical_url("mailto:info@immovlan.be"), None);
    }

    #[test]
    fn test_is_listing_url() {
        assert!(is_listing_url(LISTING));
        assert!(!is_listing_url("https://immovlan.be/en/real-estate?page=2"));
        assert!(!is_listing_url("https://partner.be/en/detail/foo"));
        assert!(!is_listing_url("https://immovlan.be/redirect/en/detail/foo"));
    }

    #[test]
    fn test_extract_listing_urls_from_dom() {
        let html = search_page_html(&[
            "/en/detail/house/for-sale/9300/aalst/rbu2?from=search",
            LISTING,
            &format!("{}/", LISTING),
            "/en/real-estate?page=2",
            "https://securepubads.g.doubleclick.net/en/detail/ad",
        ]);

        let urls = extract_listing_urls(&html);
        assert_eq!(
            urls,
            vec![
                LISTING.to_string(),
                "https://immovlan.be/en/detail/house/for-sale/9300/aalst/rbu2".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_listing_urls_from_embedded_json() {
        let html = r#"
            <html><body>
              <script type="application/json">
                {"props": {"results": [
                  {"detailUrl": "https://immovlan.be/en/detail/house/for-sale/9000/gent/rbu1?x=1"},
                  {"url": "https://immovlan.be/en/detail/house/for-sale/9000/gent/rbu2"},
                  {"url": "/relative/ignored"}
                ]}}
              </script>
              <script type="application/json">not json</script>
            </body></html>
        "#;

        let urls = extract_listing_urls(html);
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&"https://immovlan.be/en/detail/house/for-sale/9000/gent/rbu1".to_string()));
    }

    #[test]
    fn test_extract_listing_urls_empty_page() {
        assert!(extract_listing_urls("<html><body><p>No results</p></body></html>").is_empty());
    }

    #[test]
    fn test_looks_like_listing_page() {
        assert!(looks_like_listing_page(DETAIL_HTML));
        assert!(!looks_like_listing_page("<html><body><form id='login'></form></body></html>"));
    }

    #[test]
    fn test_parse_listing_detail_full_page() {
        let record = parse_listing_detail(DETAIL_HTML, "Aalst", 2, LISTING);

        assert_eq!(record.town, "Aalst");
        assert_eq!(record.page, 2);
        assert_eq!(record.property_type, Field::Value(Category::new("apartment")));
        assert_eq!(record.price, Field::Value(349000));
        assert_eq!(record.address, Field::Value("Kerkstraat 12, 9300 Aalst".to_string()));
        assert_eq!(record.postal_code, Field::Value("9300".to_string()));
        assert_eq!(record.city, Field::Value("Aalst".to_string()));
        assert_eq!(record.bedrooms, Field::Value(2));
        assert_eq!(record.bedroom1_surface, Field::Value(14.0));
        assert_eq!(record.bedroom2_surface, Field::Value(11.5));
        assert_eq!(record.bathrooms, Field::Value(1));
        assert_eq!(record.toilets, Field::Value(2));
        assert_eq!(record.surface_livable, Field::Value(92.0));
        assert_eq!(record.terrace, Field::Value(Flag(true)));
        assert_eq!(record.terrace_surface, Field::Value(8.0));
        assert_eq!(record.terrace_orientation, Field::Value(Category::new("south-west")));
        assert_eq!(record.floor, Field::Value(3));
        assert_eq!(record.year_built, Field::Value(2004));
        assert_eq!(record.condition, Field::Value(Category::new("excellent")));
        assert_eq!(record.kitchen_equipment, Field::Value(Category::new("fully equipped")));
        assert_eq!(record.cellar, Field::Value(Flag(false)));
        assert_eq!(record.glazing_type, Field::Value(Category::new("double glazing")));
        assert_eq!(record.elevator, Field::Value(Flag(true)));
        assert_eq!(record.entry_phone, Field::Value(Flag(true)));
        assert_eq!(record.epc_score, Field::Value(145.0));
        assert_eq!(record.epc_total, Field::Value(13340.0));
        assert_eq!(
            record.epc_valid_until,
            Field::Value(NaiveDate::from_ymd_opt(2030, 12, 31).unwrap())
        );
    }

    #[test]
    fn test_missing_terrace_surface_only_affects_that_field() {
        let html = DETAIL_HTML.replace("<div><h4>Surface terrace</h4><p>8 m²</p></div>", "");
        let record = parse_listing_detail(&html, "Aalst", 1, LISTING);

        assert!(record.terrace_surface.is_missing());
        assert_eq!(record.terrace, Field::Value(Flag(true)));
        assert_eq!(record.price, Field::Value(349000));
        assert_eq!(record.surface_livable, Field::Value(92.0));
        assert_eq!(record.epc_total, Field::Value(13340.0));
    }

    #[test]
    fn test_unparseable_value_becomes_missing() {
        let html = DETAIL_HTML
            .replace("€ 349,000", "Price on request")
            .replace("<p>2004</p>", "<p>unknown era</p>");
        let record = parse_listing_detail(&html, "Aalst", 1, LISTING);

        assert!(record.price.is_missing());
        assert!(record.year_built.is_missing());
        assert_eq!(record.bedrooms, Field::Value(2));
    }

    #[test]
    fn test_empty_page_gives_all_missing() {
        let record = parse_listing_detail("<html></html>", "Aalst", 1, LISTING);
        assert_eq!(record, ListingDetailRecord::empty("Aalst", 1, LISTING));

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(vec![]);
        writer.serialize(&record).unwrap();
        let row = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(row.trim().split(',').filter(|c| *c == MISSING).count(), 25);
    }

    #[test]
    fn test_split_address() {
        assert_eq!(split_address("9300 Aalst"), (Some("9300".into()), Some("Aalst".into())));
        assert_eq!(
            split_address("Stationsplein 1, 9100 Sint Niklaas"),
            (Some("9100".into()), Some("Sint Niklaas".into()))
        );
        assert_eq!(
            split_address("Kerkstraat 1024, 9000 Gent"),
            (Some("9000".into()), Some("Gent".into()))
        );
        assert_eq!(split_address("9000"), (Some("9000".into()), None));
        assert_eq!(split_address("Somewhere in Flanders"), (None, None));
    }

    #[test]
    fn test_parse_price_formats() {
        assert_eq!(parse_price("€ 349,000"), Some(349000));
        assert_eq!(parse_price("349.000 €"), Some(349000));
        assert_eq!(parse_price("1\u{00a0}250\u{00a0}000 €"), Some(1250000));
        assert_eq!(parse_price("Price on request"), None);
    }

    #[test]
    fn test_parse_decimal_formats() {
        assert_eq!(parse_decimal("85 m²"), Some(85.0));
        assert_eq!(parse_decimal("12,5 m²"), Some(12.5));
        assert_eq!(parse_decimal("19.853 kWh/year"), Some(19853.0));
        assert_eq!(parse_decimal("1,234.5"), Some(1234.5));
        assert_eq!(parse_decimal("1.234,5"), Some(1234.5));
        assert_eq!(parse_decimal("n/a"), None);
    }

    #[test]
    fn test_parse_floor_and_year() {
        assert_eq!(parse_floor("Ground floor"), Some(0));
        assert_eq!(parse_floor("2nd floor"), Some(2));
        assert_eq!(parse_floor("-1"), Some(-1));
        assert_eq!(parse_year("Built in 1975"), Some(1975));
        assert_eq!(parse_year("42"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2031, 3, 1);
        assert_eq!(parse_date("01/03/2031"), expected);
        assert_eq!(parse_date("2031-03-01"), expected);
        assert_eq!(parse_date("valid until 01/03/2031"), expected);
        assert_eq!(parse_date("soon"), None);
    }
}
