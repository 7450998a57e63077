use chrono::NaiveDate;
use weft_core::PartyId;

/// Filter describing which ledger entries to load for a party.
///
/// Results are always ordered by `(transaction_date, id)` ascending.
#[derive(Clone, Debug)]
pub struct EntryQuery {
    pub party_id: PartyId,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub include_voided: bool,
}

impl EntryQuery {
    pub fn for_party(party_id: PartyId) -> Self {
        Self {
            party_id,
            from: None,
            to: None,
            include_voided: false,
        }
    }

    pub fn with_date_range(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_voided(mut self) -> Self {
        self.include_voided = true;
        self
    }

    pub fn matches_date(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}
