//! Price-and-terms agreements between a request's client and a developer.
//!
//! Every mutation appends to the negotiation history in the same transaction
//! as the status change. The history is never rewritten.

use chrono::{DateTime, Utc};

use super::access;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{
    Agreement, AgreementStatus, AgreementWithHistory, Lifecycle, NegotiationAction,
    NegotiationEntry, ResourceKind, User, UserType,
};

#[derive(Debug, Clone)]
pub struct NewAgreement {
    pub request_id: String,
    pub developer_id: String,
    pub client_id: String,
    pub price: f64,
    pub terms: String,
}

fn load(store: &dyn Store, id: &str) -> Result<Agreement> {
    store
        .get_agreement(id)?
        .ok_or_else(|| Error::not_found("Agreement not found"))
}

fn with_history(store: &dyn Store, agreement: Agreement) -> Result<AgreementWithHistory> {
    let negotiation_history = store.list_negotiation_history(&agreement.id)?;
    Ok(AgreementWithHistory {
        agreement,
        negotiation_history,
    })
}

fn require_party(agreement: &Agreement, actor: &User, action: &str) -> Result<()> {
    if !agreement.is_party(&actor.id) {
        return Err(Error::forbidden(format!(
            "Not authorized to {action} this agreement"
        )));
    }
    Ok(())
}

pub fn propose(store: &dyn Store, actor: &User, new: NewAgreement) -> Result<AgreementWithHistory> {
    if !new.price.is_finite() || new.price < 0.0 {
        return Err(Error::bad_request("Price must be a non-negative amount"));
    }
    if new.terms.trim().is_empty() {
        return Err(Error::bad_request("Terms cannot be empty"));
    }

    let request = store
        .get_resource(&new.request_id)?
        .filter(|r| r.kind == ResourceKind::Request)
        .ok_or_else(|| Error::not_found("Request not found"))?;

    if actor.id != new.developer_id && actor.id != new.client_id {
        return Err(Error::forbidden(
            "Only the developer or the client can propose an agreement",
        ));
    }
    if new.client_id != request.owner_id {
        return Err(Error::bad_request("Agreement client must be the request owner"));
    }

    let developer = store
        .get_user(&new.developer_id)?
        .ok_or_else(|| Error::not_found("Developer not found"))?;
    if developer.user_type != UserType::Developer {
        return Err(Error::bad_request(format!(
            "User '{}' is not a developer",
            developer.username
        )));
    }
    if !access::can_read(store, &request, &developer.id)? {
        return Err(Error::forbidden(format!(
            "User '{}' cannot view this request",
            developer.username
        )));
    }

    if store.get_agreement_by_request(&request.id)?.is_some() {
        return Err(Error::conflict("An agreement already exists for this request"));
    }

    let now = Utc::now();
    let agreement = Agreement {
        id: uuid::Uuid::new_v4().to_string(),
        request_id: request.id,
        developer_id: new.developer_id,
        client_id: new.client_id,
        price: new.price,
        terms: new.terms,
        status: AgreementStatus::Proposed,
        proposed_by: actor.id.clone(),
        proposed_at: now,
        agreement_date: None,
    };
    let proposal = NegotiationEntry {
        agreement_id: agreement.id.clone(),
        seq: 1,
        action: NegotiationAction::Proposal,
        actor_id: actor.id.clone(),
        timestamp: now,
        price: agreement.price,
        terms: agreement.terms.clone(),
    };

    store.create_agreement(&agreement, &proposal)?;
    tracing::info!(id = %agreement.id, request = %agreement.request_id, by = %actor.id, price = agreement.price, "Proposed agreement");

    Ok(AgreementWithHistory {
        agreement,
        negotiation_history: vec![proposal],
    })
}

pub fn accept(
    store: &dyn Store,
    actor: &User,
    id: &str,
    accepted_at: DateTime<Utc>,
) -> Result<AgreementWithHistory> {
    let agreement = load(store, id)?;
    require_party(&agreement, actor, "accept")?;

    let next = AgreementStatus::Accepted;
    if !agreement.status.can_transition_to(next) {
        return Err(Error::bad_request(format!(
            "Cannot change status from {}",
            agreement.status
        )));
    }

    let history = store.list_negotiation_history(&agreement.id)?;
    let acceptance = NegotiationEntry {
        agreement_id: agreement.id.clone(),
        seq: history.len() as i64 + 1,
        action: NegotiationAction::Acceptance,
        actor_id: actor.id.clone(),
        timestamp: accepted_at,
        price: agreement.price,
        terms: agreement.terms.clone(),
    };

    if !store.accept_agreement(&agreement.id, &acceptance, accepted_at)? {
        return Err(Error::conflict(
            "Agreement status changed concurrently, reload and retry",
        ));
    }

    tracing::info!(id = %agreement.id, by = %actor.id, "Accepted agreement");
    with_history(store, load(store, id)?)
}

pub fn get(store: &dyn Store, actor: &User, id: &str) -> Result<AgreementWithHistory> {
    let agreement = load(store, id)?;
    require_party(&agreement, actor, "view")?;
    with_history(store, agreement)
}

pub fn get_by_request(
    store: &dyn Store,
    actor: &User,
    request_id: &str,
) -> Result<AgreementWithHistory> {
    let agreement = store
        .get_agreement_by_request(request_id)?
        .ok_or_else(|| Error::not_found("Agreement not found"))?;
    require_party(&agreement, actor, "view")?;
    with_history(store, agreement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::resources::{self, NewResource};
    use crate::service::test_support::{open_store, seed_user};

    fn setup() -> (tempfile::TempDir, crate::store::SqliteStore, User, User, String) {
        let (temp, store) = open_store();
        let client = seed_user(&store, "alice", UserType::Client);
        let dev = seed_user(&store, "bob", UserType::Developer);
        let mut new = NewResource::request("Shop", "Online store");
        new.is_public = true;
        let request = resources::create(&store, &client, new).unwrap();
        (temp, store, client, dev, request.id)
    }

    fn offer(request_id: &str, dev: &User, client: &User) -> NewAgreement {
        NewAgreement {
            request_id: request_id.to_string(),
            developer_id: dev.id.clone(),
            client_id: client.id.clone(),
            price: 100.0,
            terms: "T".to_string(),
        }
    }

    #[test]
    fn test_agreement_lifecycle() {
        let (_temp, store, client, dev, request_id) = setup();

        let proposed = propose(&store, &dev, offer(&request_id, &dev, &client)).unwrap();
        assert_eq!(proposed.agreement.status, AgreementStatus::Proposed);
        assert_eq!(proposed.negotiation_history.len(), 1);
        assert_eq!(proposed.negotiation_history[0].action, NegotiationAction::Proposal);

        let now = Utc::now();
        let accepted = accept(&store, &client, &proposed.agreement.id, now).unwrap();
        assert_eq!(accepted.agreement.status, AgreementStatus::Accepted);
        assert!(accepted.agreement.agreement_date.is_some());
        assert_eq!(accepted.negotiation_history.len(), 2);
        assert_eq!(accepted.negotiation_history[1].action, NegotiationAction::Acceptance);
        assert_eq!(accepted.negotiation_history[1].actor_id, client.id);

        let again = accept(&store, &dev, &proposed.agreement.id, Utc::now());
        assert!(matches!(again, Err(Error::BadRequest(_))));
        assert_eq!(
            store.list_negotiation_history(&proposed.agreement.id).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_only_parties_accept_or_view() {
        let (_temp, store, client, dev, request_id) = setup();
        let outsider = seed_user(&store, "eve", UserType::Developer);

        let proposed = propose(&store, &client, offer(&request_id, &dev, &client)).unwrap();

        assert!(matches!(
            accept(&store, &outsider, &proposed.agreement.id, Utc::now()),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            get_by_request(&store, &outsider, &request_id),
            Err(Error::Forbidden(_))
        ));
        assert_eq!(
            get_by_request(&store, &dev, &request_id).unwrap().agreement.id,
            proposed.agreement.id
        );
    }

    #[test]
    fn test_one_agreement_per_request() {
        let (_temp, store, client, dev, request_id) = setup();

        propose(&store, &dev, offer(&request_id, &dev, &client)).unwrap();
        assert!(matches!(
            propose(&store, &dev, offer(&request_id, &dev, &client)),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_private_request_needs_readable_developer() {
        let (_temp, store) = open_store();
        let client = seed_user(&store, "alice", UserType::Client);
        let dev = seed_user(&store, "bob", UserType::Developer);
        let stranger = seed_user(&store, "mallory", UserType::Developer);
        let request =
            resources::create(&store, &client, NewResource::request("Shop", "Online store"))
                .unwrap();
        resources::create_share(
            &store,
            &client,
            ResourceKind::Request,
            &request.id,
            &dev.id,
            false,
        )
        .unwrap();

        assert!(matches!(
            propose(&store, &stranger, offer(&request.id, &stranger, &client)),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            propose(&store, &client, offer(&request.id, &stranger, &client)),
            Err(Error::Forbidden(_))
        ));
        assert!(store.get_agreement_by_request(&request.id).unwrap().is_none());

        let proposed = propose(&store, &dev, offer(&request.id, &dev, &client)).unwrap();
        assert_eq!(proposed.agreement.developer_id, dev.id);
    }

    #[test]
    fn test_proposal_validation() {
        let (_temp, store, client, dev, request_id) = setup();
        let outsider = seed_user(&store, "eve", UserType::Developer);

        assert!(matches!(
            propose(&store, &outsider, offer(&request_id, &dev, &client)),
            Err(Error::Forbidden(_))
        ));

        let mut negative = offer(&request_id, &dev, &client);
        negative.price = -5.0;
        assert!(matches!(propose(&store, &dev, negative), Err(Error::BadRequest(_))));

        let mut wrong_client = offer(&request_id, &dev, &client);
        wrong_client.client_id = outsider.id.clone();
        assert!(matches!(
            propose(&store, &dev, wrong_client),
            Err(Error::BadRequest(_))
        ));
    }
}
