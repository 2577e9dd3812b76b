/// The 33 Greater London boroughs as they appear in the price paid data's
/// county column, upper case. 13 inner (the City of London counts here),
/// 20 outer. Membership of this set is the only filter that decides whether
/// a transaction is in scope.
pub const LONDON_BOROUGHS: [&str; 33] = [
    // inner
    "CITY OF LONDON",
    "CAMDEN",
    "GREENWICH",
    "HACKNEY",
    "HAMMERSMITH AND FULHAM",
    "ISLINGTON",
    "KENSINGTON AND CHELSEA",
    "LAMBETH",
    "LEWISHAM",
    "SOUTHWARK",
    "TOWER HAMLETS",
    "WANDSWORTH",
    "CITY OF WESTMINSTER",
    // outer
    "BARKING AND DAGENHAM",
    "BARNET",
    "BEXLEY",
    "BRENT",
    "BROMLEY",
    "CROYDON",
    "EALING",
    "ENFIELD",
    "HARINGEY",
    "HARROW",
    "HAVERING",
    "HILLINGDON",
    "HOUNSLOW",
    "KINGSTON UPON THAMES",
    "MERTON",
    "NEWHAM",
    "REDBRIDGE",
    "RICHMOND UPON THAMES",
    "SUTTON",
    "WALTHAM FOREST",
];

pub fn is_london_borough(county: &str) -> bool {
    let upper = county.to_uppercase();
    LONDON_BOROUGHS.contains(&upper.as_str())
}

/// Reconcile a boundary-file region name with the price dataset's naming.
///
/// The Ordnance Survey boundary data calls the City of Westminster plain
/// "Westminster"; the price paid data does not. Applied at the rendering
/// boundary only, never during filtering.
pub fn resolve_boundary_alias(name: &str) -> String {
    let upper = name.to_uppercase();
    match upper.as_str() {
        "WESTMINSTER" => "CITY OF WESTMINSTER".to_owned(),
        _ => upper,
    }
}
