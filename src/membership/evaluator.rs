use crate::models::criteria::Criterion;
use crate::models::user::User;

/// Whether `user` belongs to a group with the given rule lists.
///
/// The user must be active, equal every include criterion and equal no
/// exclude criterion. A missing attribute equals nothing.
pub fn matches(include: &[Criterion], exclude: &[Criterion], user: &User) -> bool {
    let equals = |criterion: &Criterion| user.attribute(criterion.category) == Some(criterion.value.as_str());

    user.is_active() && include.iter().all(equals) && !exclude.iter().any(equals)
}

/// Resolves the `userId`s of every member of `population`, in population order.
pub fn evaluate<'a, I>(include: &[Criterion], exclude: &[Criterion], population: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a User>,
{
    let mut scanned = 0usize;
    let members: Vec<String> = population
        .into_iter()
        .inspect(|_| scanned += 1)
        .filter(|user| matches(include, exclude, user))
        .map(|user| user.user_id.clone())
        .collect();

    tracing::debug!(
        include = include.len(),
        exclude = exclude.len(),
        scanned,
        matched = members.len(),
        "criteria evaluated"
    );

    members
}
